//! Process lookup through `/proc`.

use std::fs;
use std::io::ErrorKind;

use strum::{Display, IntoStaticStr};

use crate::error::{Error, Result};

/// Scheduler state from the third field of `/proc/<pid>/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ProcessState {
    Running,
    Sleeping,
    DiskSleep,
    Stopped,
    TracingStop,
    Zombie,
    Dead,
    Idle,
    Other,
}

impl ProcessState {
    pub fn from_code(code: char) -> Self {
        match code {
            'R' => Self::Running,
            'S' => Self::Sleeping,
            'D' => Self::DiskSleep,
            'T' => Self::Stopped,
            't' => Self::TracingStop,
            'Z' => Self::Zombie,
            'X' | 'x' => Self::Dead,
            'I' => Self::Idle,
            _ => Self::Other,
        }
    }

    pub fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped | Self::TracingStop)
    }

    /// No task is left to run (exited but not yet reaped, or dying).
    pub fn is_gone(self) -> bool {
        matches!(self, Self::Zombie | Self::Dead)
    }
}

/// Extract the state from a `/proc/<pid>/stat` line.
///
/// The command name is wrapped in parentheses and may itself contain
/// spaces or parentheses, so the state is found after the last `)`.
pub fn parse_stat_state(stat: &str) -> Option<ProcessState> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let code = rest.trim_start().chars().next()?;
    Some(ProcessState::from_code(code))
}

/// Read the current state of `pid`.
pub fn read_state(pid: i32) -> Result<ProcessState> {
    let path = format!("/proc/{pid}/stat");
    let stat = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::ProcessNotFound(pid)),
        // ESRCH when the task exits between open and read
        Err(e) if e.raw_os_error() == Some(nix::libc::ESRCH) => {
            return Err(Error::ProcessNotFound(pid));
        }
        Err(e) => return Err(Error::Io(e)),
    };
    parse_stat_state(&stat)
        .ok_or_else(|| Error::unavailable(pid, format!("unreadable stat line in {path}")))
}

/// Resolve `pid` to a live process with a task that can be controlled.
pub fn locate(pid: i32) -> Result<ProcessState> {
    let state = read_state(pid)?;
    if state.is_gone() {
        return Err(Error::unavailable(pid, format!("process is {state}")));
    }
    Ok(state)
}
