//! Stop a process and wait, bounded, until it is observed stopped.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, warn};

use crate::config::InjectorConfig;
use crate::error::{Error, Result};
use crate::process::ProcessControl;

/// Proof that a process was confirmed stopped.
///
/// Only [`SuspensionController::suspend`] hands these out; mutation and
/// resume take one so they cannot run on an unconfirmed process.
#[derive(Debug)]
pub struct Suspended {
    pid: i32,
    waited: Duration,
}

impl Suspended {
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Time between the stop request and its confirmation.
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SuspensionController {
    timeout: Duration,
    poll_interval: Duration,
}

impl SuspensionController {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            // a zero interval would spin
            poll_interval: poll_interval.max(Duration::from_micros(1)),
        }
    }

    pub fn from_config(config: &InjectorConfig) -> Self {
        Self::new(config.stop_timeout(), config.poll_interval())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request a stop and wait for confirmation.
    ///
    /// On timeout a continue request is sent before returning
    /// `StopTimeout`, so the process is not left suspended.
    pub fn suspend<C>(&self, control: &C, pid: i32) -> Result<Suspended>
    where
        C: ProcessControl + ?Sized,
    {
        control.request_stop(pid).map_err(|source| {
            error!("Error stopping process {}: {}", pid, source);
            Error::StopRequestFailed { pid, source }
        })?;

        let started = Instant::now();
        let deadline = started + self.timeout;

        loop {
            match control.is_stopped(pid) {
                Ok(true) => {
                    return Ok(Suspended {
                        pid,
                        waited: started.elapsed(),
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    error!("Lost process {} while waiting for it to stop: {}", pid, e);
                    abort(control, pid);
                    return Err(match e {
                        Error::ProcessNotFound(_) => {
                            Error::unavailable(pid, "process vanished while stopping")
                        }
                        other => other,
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                error!(
                    "Waited {:?}, process {} still not stopped",
                    self.timeout, pid
                );
                abort(control, pid);
                return Err(Error::StopTimeout {
                    pid,
                    timeout: self.timeout,
                });
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

fn abort<C: ProcessControl + ?Sized>(control: &C, pid: i32) {
    if let Err(e) = control.request_continue(pid) {
        warn!("Best-effort continue of process {} failed: {}", pid, e);
    }
}
