//! Per-pass lock arbitration
//!
//! A fresh [`LockTable`] is built for every drain pass. Requests are offered
//! in queue order; a refused request stays queued for the next pass.
//!
//! ```text
//!   NONE ──read──► READ ──write──► ALL      (write and later reads refused)
//!     │
//!     └──write──► WRITE                     (everything else refused)
//! ```

use std::collections::HashMap;

/// Kind of access a request needs on its key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyLock {
    Read,
    Write,
    All,
}

#[derive(Debug, Default)]
pub(crate) struct LockTable {
    locks: HashMap<String, KeyLock>,
    /// A whole-keyspace read (enumeration) was granted this pass
    scan: bool,
}

impl LockTable {
    /// Offer a request; `true` means it may run in this pass
    pub(crate) fn acquire(&mut self, key: &str, access: Access) -> bool {
        let current = self.locks.get(key).copied();
        let (next, granted) = match (current, access) {
            (None, Access::Read) => (KeyLock::Read, true),
            (None, Access::Write) if self.scan => (KeyLock::All, false),
            (None, Access::Write) => (KeyLock::Write, true),
            (Some(KeyLock::Read), Access::Read) => (KeyLock::Read, true),
            (Some(KeyLock::Read), Access::Write) => (KeyLock::All, false),
            (Some(held), _) => (held, false),
        };
        if current != Some(next) {
            self.locks.insert(key.to_string(), next);
        }
        granted
    }

    /// Offer a whole-keyspace read; refused once any key is write-held
    pub(crate) fn acquire_scan(&mut self) -> bool {
        let blocked = self
            .locks
            .values()
            .any(|lock| matches!(lock, KeyLock::Write | KeyLock::All));
        if !blocked {
            self.scan = true;
        }
        !blocked
    }
}
