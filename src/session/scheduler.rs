use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::foundation::error::WarpResult;

struct Shared<P> {
    /// Latest requested parameters; a new request replaces an unprocessed one.
    slot: Mutex<Option<P>>,
    /// Set while a step runs. Written under the `slot` lock when a step starts.
    busy: AtomicBool,
    quit: AtomicBool,
    completed: AtomicU64,
    wake: Sender<()>,
}

impl<P> Shared<P> {
    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<P>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A background loop that runs one step at a time with the most recent parameters.
///
/// Bursts of [`request`](Self::request) calls coalesce: at most one step runs and at most one is
/// pending. A panicking step is logged and the loop keeps going.
pub(crate) struct Worker<P: Send + 'static> {
    name: &'static str,
    shared: Arc<Shared<P>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Send + 'static> Worker<P> {
    pub(crate) fn spawn<F>(name: &'static str, mut step: F) -> WarpResult<Self>
    where
        F: FnMut(P) + Send + 'static,
    {
        let (wake, rx): (Sender<()>, Receiver<()>) = bounded(1);
        let shared = Arc::new(Shared {
            slot: Mutex::new(None),
            busy: AtomicBool::new(false),
            quit: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            wake,
        });

        let inner = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(format!("tilewarp-{name}"))
            .spawn(move || {
                while rx.recv().is_ok() {
                    if inner.quit.load(Ordering::Acquire) {
                        break;
                    }
                    let params = {
                        let mut slot = inner.lock_slot();
                        let p = slot.take();
                        if p.is_some() {
                            inner.busy.store(true, Ordering::Release);
                        }
                        p
                    };
                    let Some(params) = params else {
                        continue;
                    };
                    if catch_unwind(AssertUnwindSafe(|| step(params))).is_err() {
                        tracing::error!(worker = name, "worker step panicked");
                    }
                    inner.completed.fetch_add(1, Ordering::AcqRel);
                    inner.busy.store(false, Ordering::Release);
                }
                tracing::debug!(worker = name, "worker stopped");
            })
            .with_context(|| format!("spawn {name} worker thread"))?;

        Ok(Self {
            name,
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Replace the pending parameters and wake the loop. Ignored after [`quit`](Self::quit).
    pub(crate) fn request(&self, params: P) {
        if self.shared.quit.load(Ordering::Acquire) {
            return;
        }
        *self.shared.lock_slot() = Some(params);
        match self.shared.wake.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                tracing::debug!(worker = self.name, "request after worker exit");
            }
        }
    }

    /// Steps finished since spawn, including ones that panicked.
    pub(crate) fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    pub(crate) fn is_idle(&self) -> bool {
        let slot = self.shared.lock_slot();
        slot.is_none() && !self.shared.busy.load(Ordering::Acquire)
    }

    /// Poll until idle; false if `timeout` elapsed first.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Stop the loop after the current step and join it. Pending parameters are dropped.
    pub(crate) fn quit(&self) {
        self.shared.quit.store(true, Ordering::Release);
        self.shared.lock_slot().take();
        let _ = self.shared.wake.try_send(());
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(h) = handle
            && h.thread().id() != std::thread::current().id()
            && h.join().is_err()
        {
            tracing::error!(worker = self.name, "worker thread panicked while stopping");
        }
    }
}

impl<P: Send + 'static> Drop for Worker<P> {
    fn drop(&mut self) {
        self.quit();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/scheduler.rs"]
mod tests;
