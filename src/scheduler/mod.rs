//! Scheduler Module
//!
//! The scheduling primitive shared by the engine and the index manager.
//!
//! ## Responsibilities
//! - Collect requests pushed from any thread into one queue
//! - Coalesce everything pushed between passes into a single drain pass
//! - Guarantee at most one drain pass executing per queue
//! - Settle every request exactly once, including on shutdown
//!
//! ## Pass Lifecycle
//! ```text
//!   push ──► inbox ──(wake)──► worker: inbox → live queue
//!                                   │
//!                                   ▼
//!                       Consumer::drain(&mut live)
//!                       ├─ serviced: removed, settled
//!                       └─ deferred: left in place for the next pass
//!                                   │
//!                     live or inbox non-empty? ──► next pass
//! ```

mod completion;
mod queue;

pub use completion::{channel, Completion, Settle};
pub use queue::{Consumer, DrainQueue};

/// Run `f` over `items` on up to `workers` threads, returning once every
/// item has been processed
///
/// This is the body of a drain pass: granted requests never conflict with
/// each other, so they may run side by side, but the pass only ends once
/// all of them are done.
pub fn run_concurrently<T, F>(items: Vec<T>, workers: usize, f: F)
where
    T: Send,
    F: Fn(T) + Sync,
{
    let workers = workers.min(items.len());
    if workers <= 1 {
        items.into_iter().for_each(&f);
        return;
    }

    let (tx, rx) = crossbeam::channel::unbounded();
    for item in items {
        // The receiver lives until the scope below ends
        let _ = tx.send(item);
    }
    drop(tx);

    let f = &f;
    std::thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            scope.spawn(move || {
                for item in rx.iter() {
                    f(item);
                }
            });
        }
    });
}
