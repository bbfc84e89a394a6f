use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// A one-shot stop flag with interruptible sleeps.
///
/// Watcher sessions, the queue feed and the CLI main loop each hold one.
/// Sleeping through [`StopSignal::wait`] instead of `thread::sleep()` lets a
/// settle delay or poll interval end as soon as the owner asks to stop.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter.
    pub fn trigger(&self) {
        let _guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        self.stopped.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless the signal fires first.
    ///
    /// Returns `true` if the signal was triggered.
    pub fn wait(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }

        let guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        let (_guard, _timeout) = self
            .condvar
            .wait_timeout_while(guard, duration, |_| !self.is_triggered())
            .unwrap_or_else(PoisonError::into_inner);

        self.is_triggered()
    }
}
