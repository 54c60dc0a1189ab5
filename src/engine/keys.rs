//! Key arguments
//!
//! Public operations take "a key or keys"; [`Keys`] accepts either.

use std::collections::HashMap;

/// One or more keys addressed by a single call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keys(Vec<String>);

impl Keys {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Distinct keys in first-seen order, plus for every original position
    /// the index of its distinct key
    pub(crate) fn dedupe(self) -> (Vec<String>, Vec<usize>) {
        let mut seen: HashMap<String, usize> = HashMap::with_capacity(self.0.len());
        let mut distinct = Vec::with_capacity(self.0.len());
        let mut positions = Vec::with_capacity(self.0.len());

        for key in self.0 {
            let slot = match seen.get(&key) {
                Some(&slot) => slot,
                None => {
                    let slot = distinct.len();
                    seen.insert(key.clone(), slot);
                    distinct.push(key);
                    slot
                }
            };
            positions.push(slot);
        }
        (distinct, positions)
    }
}

impl From<&str> for Keys {
    fn from(key: &str) -> Self {
        Keys(vec![key.to_string()])
    }
}

impl From<String> for Keys {
    fn from(key: String) -> Self {
        Keys(vec![key])
    }
}

impl From<&String> for Keys {
    fn from(key: &String) -> Self {
        Keys(vec![key.clone()])
    }
}

impl From<Vec<String>> for Keys {
    fn from(keys: Vec<String>) -> Self {
        Keys(keys)
    }
}

impl From<Vec<&str>> for Keys {
    fn from(keys: Vec<&str>) -> Self {
        Keys(keys.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Keys {
    fn from(keys: &[&str]) -> Self {
        Keys(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl From<&[String]> for Keys {
    fn from(keys: &[String]) -> Self {
        Keys(keys.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for Keys {
    fn from(keys: [&str; N]) -> Self {
        Keys(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl FromIterator<String> for Keys {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Keys(iter.into_iter().collect())
    }
}
