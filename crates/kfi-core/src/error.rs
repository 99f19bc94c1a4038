use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

use crate::record::InjectionRecord;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed request: {0}")]
    MalformedInput(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(i32),

    #[error("No controllable task for process {pid}: {reason}")]
    TaskUnavailable { pid: i32, reason: String },

    #[error("Failed to stop process {pid}: {source}")]
    StopRequestFailed {
        pid: i32,
        #[source]
        source: Errno,
    },

    #[error("Process {pid} did not stop within {timeout:?}")]
    StopTimeout { pid: i32, timeout: Duration },

    #[error("Failed to resume process {pid}, it is left stopped: {source}")]
    ResumeFailed {
        pid: i32,
        /// The injection that committed before the resume failed, if any.
        injected: Option<InjectionRecord>,
        #[source]
        source: Errno,
    },

    #[error("Unsupported architecture: {0}")]
    UnsupportedArch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn unavailable(pid: i32, reason: impl Into<String>) -> Self {
        Error::TaskUnavailable {
            pid,
            reason: reason.into(),
        }
    }

    /// The target process was left stopped and needs a manual `SIGCONT`.
    pub fn is_partial_failure(&self) -> bool {
        matches!(self, Error::ResumeFailed { .. })
    }

    /// Whether a bit was flipped before this error was raised.
    pub fn mutation_committed(&self) -> bool {
        matches!(
            self,
            Error::ResumeFailed {
                injected: Some(_),
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> InjectionRecord {
        InjectionRecord {
            pid: 4321,
            register: 5,
            register_name: "rbx",
            bit: 3,
        }
    }

    #[test]
    fn test_only_resume_failure_is_partial() {
        let err = Error::ResumeFailed {
            pid: 4321,
            injected: Some(sample_record()),
            source: Errno::EPERM,
        };
        assert!(err.is_partial_failure());
        assert!(err.mutation_committed());

        let timeout = Error::StopTimeout {
            pid: 4321,
            timeout: Duration::from_micros(500),
        };
        assert!(!timeout.is_partial_failure());
        assert!(!timeout.mutation_committed());
        assert!(!Error::ProcessNotFound(4321).is_partial_failure());
    }

    #[test]
    fn test_resume_failure_without_mutation() {
        let err = Error::ResumeFailed {
            pid: 7,
            injected: None,
            source: Errno::EPERM,
        };
        assert!(err.is_partial_failure());
        assert!(!err.mutation_committed());
        assert!(err.to_string().contains("left stopped"));
    }
}
