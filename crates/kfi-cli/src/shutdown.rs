use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Shutdown flag with waits that end as soon as it is triggered.
///
/// The campaign loop sleeps on this between injections so Ctrl+C is
/// handled without waiting out the current interval.
pub struct ShutdownSignal {
    triggered: Mutex<bool>,
    condvar: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            triggered: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Trigger the shutdown signal, waking all waiting threads.
    pub fn trigger(&self) {
        *self.triggered.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.condvar.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        *self.triggered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for `duration` or until shutdown is triggered.
    ///
    /// Returns `true` if shutdown was triggered.
    pub fn wait(&self, duration: Duration) -> bool {
        let guard = self.triggered.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .condvar
            .wait_timeout_while(guard, duration, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
