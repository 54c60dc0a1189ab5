//! Drain queue
//!
//! Requests pushed from any thread land in an inbox. A single worker thread
//! moves everything that arrived since the previous pass onto its live queue
//! and hands the live queue to a [`Consumer`]. The consumer services what it
//! can and leaves the rest in place; the worker re-arms immediately while
//! anything is left or newly arrived.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

/// Services requests during drain passes
pub trait Consumer<R>: Send + 'static {
    /// Run one pass over the live queue, removing every serviced request.
    /// Returning `false` stops the queue after this pass.
    fn drain(&mut self, queue: &mut VecDeque<R>) -> bool;

    /// Settle a request that will never be serviced because the queue stopped
    fn abandon(&mut self, request: R);
}

struct Inbox<R> {
    items: Vec<R>,
    stopped: bool,
}

struct Shared<R> {
    inbox: Mutex<Inbox<R>>,
    wake: Condvar,
    /// Requests left on the worker's live queue after the last pass
    deferred: AtomicUsize,
}

/// Coalescing request queue drained by one dedicated worker thread
pub struct DrainQueue<R> {
    name: String,
    shared: Arc<Shared<R>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Send + 'static> DrainQueue<R> {
    /// Start the worker thread for `consumer`
    pub fn spawn<C>(name: &str, consumer: C) -> io::Result<Self>
    where
        C: Consumer<R>,
    {
        let shared = Arc::new(Shared {
            inbox: Mutex::new(Inbox {
                items: Vec::new(),
                stopped: false,
            }),
            wake: Condvar::new(),
            deferred: AtomicUsize::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || drain_loop(worker_shared, consumer))?;

        Ok(Self {
            name: name.to_string(),
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Enqueue a request; hands it back if the queue has stopped
    pub fn push(&self, request: R) -> Result<(), R> {
        let mut inbox = self.shared.inbox.lock();
        if inbox.stopped {
            return Err(request);
        }
        inbox.items.push(request);
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Requests not yet serviced (queued plus deferred)
    pub fn len(&self) -> usize {
        self.shared.inbox.lock().items.len() + self.shared.deferred.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.inbox.lock().stopped
    }

    /// Stop accepting requests; the worker exits after its current pass
    pub fn stop(&self) {
        let mut inbox = self.shared.inbox.lock();
        inbox.stopped = true;
        self.shared.wake.notify_all();
    }

    /// Wait for the worker thread to exit
    ///
    /// A no-op when called from the worker itself or when already joined.
    pub fn join(&self) {
        let handle = {
            let mut worker = self.worker.lock();
            match worker.as_ref() {
                Some(h) if h.thread().id() == thread::current().id() => return,
                _ => worker.take(),
            }
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Drain worker {} panicked", self.name);
            }
        }
    }
}

impl<R> Drop for DrainQueue<R> {
    fn drop(&mut self) {
        {
            let mut inbox = self.shared.inbox.lock();
            inbox.stopped = true;
            self.shared.wake.notify_all();
        }
        let handle = self.worker.get_mut().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!("Drain worker {} panicked", self.name);
            }
        }
    }
}

fn drain_loop<R, C: Consumer<R>>(shared: Arc<Shared<R>>, mut consumer: C) {
    let mut live: VecDeque<R> = VecDeque::new();
    let mut passes: u64 = 0;

    loop {
        {
            let mut inbox = shared.inbox.lock();
            while inbox.items.is_empty() && live.is_empty() && !inbox.stopped {
                shared.wake.wait(&mut inbox);
            }
            if inbox.stopped {
                break;
            }
            live.extend(inbox.items.drain(..));
        }

        passes += 1;
        let queued = live.len();
        let keep_going = consumer.drain(&mut live);
        shared.deferred.store(live.len(), Ordering::Release);

        tracing::trace!(
            "Drain pass {} on {:?}: {} queued, {} deferred",
            passes,
            thread::current().name(),
            queued,
            live.len()
        );

        if !keep_going {
            break;
        }
    }

    let leftovers: Vec<R> = {
        let mut inbox = shared.inbox.lock();
        inbox.stopped = true;
        inbox.items.drain(..).collect()
    };
    shared.deferred.store(0, Ordering::Release);
    for request in live.into_iter().chain(leftovers) {
        consumer.abandon(request);
    }
}
