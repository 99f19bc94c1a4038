//! # kfi-core
//!
//! Single-bit register fault injection for running processes.
//!
//! This crate provides:
//! - Request parsing (`"<pid> [register] [bit]"`)
//! - Register tables for x86_64 and x86
//! - The injection engine: stop, select, flip, resume
//! - Linux process control via signals, `/proc` and ptrace
//! - Fault campaign scheduling and statistics

pub mod campaign;
pub mod config;
pub mod error;
pub mod injector;
pub mod mutator;
pub mod process;
pub mod record;
pub mod registers;
pub mod request;
pub mod resume;
pub mod selector;
pub mod suspend;

pub use campaign::{CampaignConfig, CampaignStats, FaultClock};
pub use config::{InjectorConfig, InjectorConfigBuilder};
pub use error::{Error, Result};
pub use injector::Injector;
pub use process::{ProcessControl, ProcessState, TaskSession};
pub use record::InjectionRecord;
pub use registers::{Arch, RegisterSnapshot, RegisterTable};
pub use request::{InjectionRequest, MAX_REQUEST_LEN};
pub use selector::{FaultSelector, FaultTarget, Selection};
pub use suspend::{SuspensionController, Suspended};

#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "x86")))]
pub use process::LinuxProcessControl;

/// Inject a random fault into `pid` with default settings.
///
/// Returns the report line for the injection.
#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "x86")))]
pub fn inject_pid(pid: i32) -> Result<String> {
    let injector = Injector::new(LinuxProcessControl::new()?, InjectorConfig::default());
    let record = injector.inject_request(&InjectionRequest::random(pid))?;
    Ok(record.to_string())
}

#[cfg(all(
    test,
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "x86")
))]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    #[test]
    fn test_inject_pid_reports_random_fault() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id() as i32;

        let report = inject_pid(pid).unwrap();
        assert!(
            report.starts_with(&format!("Injected process {pid}, register ")),
            "{report}"
        );

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_inject_pid_unknown_process() {
        assert!(matches!(
            inject_pid(i32::MAX),
            Err(Error::ProcessNotFound(_))
        ));
    }
}
