//! Completion handles
//!
//! A [`Completion`] is the caller's side of a queued request: it settles
//! exactly once with the request's result. The producing side is a
//! [`Settle`], consumed on use so it cannot settle twice.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::error::{BurrowError, ErrorCode, ErrorDetail, Result};

/// Create a linked settle/completion pair
pub fn channel<T>() -> (Settle<T>, Completion<T>) {
    let (tx, rx) = channel::bounded(1);
    (
        Settle { tx },
        Completion {
            state: State::Waiting(rx),
        },
    )
}

/// Producer half: settles the paired [`Completion`]
#[derive(Debug)]
pub struct Settle<T> {
    tx: Sender<Result<T>>,
}

impl<T> Settle<T> {
    pub fn settle(self, result: Result<T>) {
        // The caller may have dropped its completion; nothing to deliver then
        let _ = self.tx.send(result);
    }

    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(self, error: BurrowError) {
        self.settle(Err(error));
    }
}

enum State<T> {
    Ready(Result<T>),
    Waiting(Receiver<Result<T>>),
    Chained(Box<dyn FnOnce() -> Result<T> + Send>),
}

/// Consumer half: the eventual result of a request
pub struct Completion<T> {
    state: State<T>,
}

impl<T: Send + 'static> Completion<T> {
    /// An already-resolved completion
    pub fn ready(value: T) -> Self {
        Self {
            state: State::Ready(Ok(value)),
        }
    }

    /// An already-rejected completion
    pub fn failed(error: BurrowError) -> Self {
        Self {
            state: State::Ready(Err(error)),
        }
    }

    /// Block until the result is available
    pub fn wait(self) -> Result<T> {
        match self.state {
            State::Ready(result) => result,
            State::Waiting(rx) => rx.recv().unwrap_or_else(|_| Err(abandoned())),
            State::Chained(run) => run(),
        }
    }

    /// Block for at most `timeout`; hands the completion back if it is
    /// still pending
    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
        match self.state {
            State::Waiting(rx) => match rx.recv_timeout(timeout) {
                Ok(result) => Ok(result),
                Err(RecvTimeoutError::Timeout) => Err(Self {
                    state: State::Waiting(rx),
                }),
                Err(RecvTimeoutError::Disconnected) => Ok(Err(abandoned())),
            },
            state => Ok(Self { state }.wait()),
        }
    }

    /// Whether `wait` would return without blocking on a queued request
    pub fn is_settled(&self) -> bool {
        match &self.state {
            State::Ready(_) => true,
            State::Waiting(rx) => !rx.is_empty(),
            State::Chained(_) => false,
        }
    }

    /// Chain a continuation, evaluated when the result is waited on
    pub fn then<U, F>(self, f: F) -> Completion<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        Completion {
            state: State::Chained(Box::new(move || f(self.wait()?))),
        }
    }

    /// Wait for every completion, preserving order
    ///
    /// All of them are waited on even after a failure. The first failure is
    /// returned with every later failure accumulated onto it as a detail.
    pub fn join_all(items: Vec<Completion<T>>) -> Completion<Vec<T>> {
        Completion {
            state: State::Chained(Box::new(move || {
                let mut values = Vec::with_capacity(items.len());
                let mut failure: Option<BurrowError> = None;
                for item in items {
                    match item.wait() {
                        Ok(value) => values.push(value),
                        Err(e) => match failure.as_mut() {
                            None => failure = Some(e),
                            Some(first) => first.push(ErrorDetail::Cause(e.to_string())),
                        },
                    }
                }
                match failure {
                    Some(e) => Err(e),
                    None => Ok(values),
                }
            })),
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Ready(_) => "ready",
            State::Waiting(_) => "waiting",
            State::Chained(_) => "chained",
        };
        f.debug_struct("Completion").field("state", &state).finish()
    }
}

fn abandoned() -> BurrowError {
    BurrowError::new(ErrorCode::Unknown).with(ErrorDetail::Cause(
        "request was dropped before it settled".to_string(),
    ))
}
