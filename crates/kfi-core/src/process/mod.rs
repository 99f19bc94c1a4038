//! Operating-system process control.
//!
//! [`ProcessControl`] is the seam between the injection engine and the
//! platform: locating a process, delivering stop/continue requests,
//! observing the stopped state, and attaching to read and write the saved
//! registers of a stopped task.

#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "x86")))]
mod linux;
pub mod locator;

#[cfg(test)]
pub mod mock;

#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "x86")))]
pub use linux::LinuxProcessControl;
pub use locator::ProcessState;

#[cfg(test)]
pub use mock::{MockEvent, MockProcess, MockProcessControl, StopBehavior};

use nix::errno::Errno;

use crate::error::Result;
use crate::registers::{Arch, RegisterSnapshot};

pub trait ProcessControl {
    /// Architecture whose register table matches this backend's snapshots.
    fn arch(&self) -> Arch;

    /// Fails with `ProcessNotFound` or `TaskUnavailable`.
    fn locate(&self, pid: i32) -> Result<()>;

    /// Ask the OS to stop the process. Delivery is asynchronous.
    fn request_stop(&self, pid: i32) -> std::result::Result<(), Errno>;

    fn is_stopped(&self, pid: i32) -> Result<bool>;

    fn request_continue(&self, pid: i32) -> std::result::Result<(), Errno>;

    /// Take exclusive hold of a stopped task's registers.
    ///
    /// The hold is released when the returned session is dropped. Fails
    /// with `TaskUnavailable` if the task can no longer be held.
    fn attach(&self, pid: i32) -> Result<Box<dyn TaskSession + '_>>;
}

/// Exclusive access to one stopped task's saved registers.
pub trait TaskSession {
    fn read_registers(&mut self) -> Result<RegisterSnapshot>;

    fn write_registers(&mut self, snapshot: &RegisterSnapshot) -> Result<()>;
}
