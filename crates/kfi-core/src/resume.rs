//! Let a suspended process run again.

use nix::errno::Errno;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::process::ProcessControl;
use crate::record::InjectionRecord;
use crate::suspend::Suspended;

/// Send the continue request for a suspended process.
///
/// `committed` is the injection already applied, if any. It travels in
/// the `ResumeFailed` error so callers know the flip happened even though
/// the process is still stopped.
pub fn resume<C>(
    control: &C,
    suspended: Suspended,
    committed: Option<InjectionRecord>,
) -> Result<()>
where
    C: ProcessControl + ?Sized,
{
    let pid = suspended.pid();
    match control.request_continue(pid) {
        Ok(()) => {
            debug!("Resumed process {}", pid);
            Ok(())
        }
        Err(source) => {
            error!("Error continuing process {}: {}", pid, source);
            Err(Error::ResumeFailed {
                pid,
                injected: committed,
                source,
            })
        }
    }
}

/// Resume after a failed mutation and pick the error to report.
///
/// A resume failure wins because it leaves the process stopped, unless
/// the process no longer exists at all.
pub fn resume_after_failure<C>(control: &C, suspended: Suspended, cause: Error) -> Error
where
    C: ProcessControl + ?Sized,
{
    match resume(control, suspended, None) {
        Ok(()) => cause,
        Err(Error::ResumeFailed {
            source: Errno::ESRCH,
            ..
        }) => cause,
        Err(resume_err) => resume_err,
    }
}
