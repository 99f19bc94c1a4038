//! Linux process control: signals for stop/continue, `/proc` for state,
//! ptrace for register access.

use nix::errno::Errno;
use nix::libc::user_regs_struct;
use nix::sys::ptrace;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::{ProcessControl, TaskSession, locator};
use crate::error::{Error, Result};
use crate::registers::{Arch, RegisterSnapshot, RegisterTable};

#[derive(Debug, Clone, Copy)]
pub struct LinuxProcessControl {
    arch: Arch,
}

impl LinuxProcessControl {
    pub fn new() -> Result<Self> {
        let arch = Arch::host()
            .ok_or_else(|| Error::UnsupportedArch(std::env::consts::ARCH.to_string()))?;
        Ok(Self { arch })
    }
}

impl ProcessControl for LinuxProcessControl {
    fn arch(&self) -> Arch {
        self.arch
    }

    fn locate(&self, pid: i32) -> Result<()> {
        match kill(Pid::from_raw(pid), None) {
            Err(Errno::ESRCH) => return Err(Error::ProcessNotFound(pid)),
            // EPERM still proves the process exists; the stop request reports it
            Ok(()) | Err(_) => {}
        }
        let state = locator::locate(pid)?;
        debug!("Located process {} ({})", pid, state);
        Ok(())
    }

    fn request_stop(&self, pid: i32) -> std::result::Result<(), Errno> {
        kill(Pid::from_raw(pid), Signal::SIGSTOP)
    }

    fn is_stopped(&self, pid: i32) -> Result<bool> {
        let state = locator::read_state(pid)?;
        if state.is_gone() {
            return Err(Error::unavailable(pid, format!("process is {state}")));
        }
        Ok(state.is_stopped())
    }

    fn request_continue(&self, pid: i32) -> std::result::Result<(), Errno> {
        kill(Pid::from_raw(pid), Signal::SIGCONT)
    }

    fn attach(&self, pid: i32) -> Result<Box<dyn TaskSession + '_>> {
        let session = PtraceSession::seize(pid, RegisterTable::for_arch(self.arch))?;
        Ok(Box::new(session))
    }
}

/// A ptrace hold on a group-stopped task.
///
/// Seizing a stopped task moves it into a ptrace-stop, which the kernel
/// only reports if the task still exists. It stays there until detach, and
/// detaching leaves the group stop in place for the later `SIGCONT`.
struct PtraceSession {
    pid: Pid,
    table: &'static RegisterTable,
    regs: Option<user_regs_struct>,
}

impl PtraceSession {
    fn seize(pid: i32, table: &'static RegisterTable) -> Result<Self> {
        let target = Pid::from_raw(pid);
        ptrace::seize(target, ptrace::Options::empty())
            .map_err(|e| Error::unavailable(pid, format!("ptrace seize failed: {e}")))?;

        // Detach on drop from here on
        let session = Self {
            pid: target,
            table,
            regs: None,
        };

        ptrace::interrupt(target)
            .map_err(|e| Error::unavailable(pid, format!("ptrace interrupt failed: {e}")))?;

        match waitpid(target, Some(WaitPidFlag::__WALL)) {
            Ok(WaitStatus::PtraceEvent(..)) | Ok(WaitStatus::Stopped(..)) => Ok(session),
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => {
                Err(Error::unavailable(pid, "process exited before attach"))
            }
            Ok(status) => Err(Error::unavailable(
                pid,
                format!("unexpected wait status {status:?}"),
            )),
            Err(e) => Err(Error::unavailable(pid, format!("waitpid failed: {e}"))),
        }
    }

    fn raw_registers(&mut self) -> Result<user_regs_struct> {
        if let Some(regs) = self.regs {
            return Ok(regs);
        }
        let regs = ptrace::getregs(self.pid).map_err(|e| {
            Error::unavailable(self.pid.as_raw(), format!("ptrace getregs failed: {e}"))
        })?;
        self.regs = Some(regs);
        Ok(regs)
    }
}

impl TaskSession for PtraceSession {
    fn read_registers(&mut self) -> Result<RegisterSnapshot> {
        let mut regs = self.raw_registers()?;
        let words = (0..self.table.reg_count())
            .map(|i| load_word(&mut regs, i))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                Error::unavailable(self.pid.as_raw(), "register table larger than user_regs")
            })?;
        Ok(RegisterSnapshot::new(words, self.table.word_bits()))
    }

    fn write_registers(&mut self, snapshot: &RegisterSnapshot) -> Result<()> {
        let mut regs = self.raw_registers()?;
        for (index, &word) in snapshot.words().iter().enumerate() {
            if !store_word(&mut regs, index, word) {
                return Err(Error::unavailable(
                    self.pid.as_raw(),
                    format!("no register slot {index}"),
                ));
            }
        }
        ptrace::setregs(self.pid, regs).map_err(|e| {
            Error::unavailable(self.pid.as_raw(), format!("ptrace setregs failed: {e}"))
        })?;
        self.regs = Some(regs);
        Ok(())
    }
}

impl Drop for PtraceSession {
    fn drop(&mut self) {
        match ptrace::detach(self.pid, None) {
            Ok(()) => debug!("Detached from process {}", self.pid),
            Err(Errno::ESRCH) => debug!("Process {} gone before detach", self.pid),
            Err(e) => warn!("Failed to detach from process {}: {}", self.pid, e),
        }
    }
}

// Slot order matches X86_64_REGISTERS.
#[cfg(target_arch = "x86_64")]
fn slot(regs: &mut user_regs_struct, index: usize) -> Option<&mut u64> {
    Some(match index {
        0 => &mut regs.r15,
        1 => &mut regs.r14,
        2 => &mut regs.r13,
        3 => &mut regs.r12,
        4 => &mut regs.rbp,
        5 => &mut regs.rbx,
        6 => &mut regs.r11,
        7 => &mut regs.r10,
        8 => &mut regs.r9,
        9 => &mut regs.r8,
        10 => &mut regs.rax,
        11 => &mut regs.rcx,
        12 => &mut regs.rdx,
        13 => &mut regs.rsi,
        14 => &mut regs.rdi,
        15 => &mut regs.orig_rax,
        _ => return None,
    })
}

#[cfg(target_arch = "x86_64")]
fn load_word(regs: &mut user_regs_struct, index: usize) -> Option<u64> {
    slot(regs, index).map(|w| *w)
}

#[cfg(target_arch = "x86_64")]
fn store_word(regs: &mut user_regs_struct, index: usize, value: u64) -> bool {
    slot(regs, index).map(|w| *w = value).is_some()
}

// Slot order matches X86_REGISTERS.
#[cfg(target_arch = "x86")]
fn slot(regs: &mut user_regs_struct, index: usize) -> Option<&mut nix::libc::c_long> {
    Some(match index {
        0 => &mut regs.ebx,
        1 => &mut regs.ecx,
        2 => &mut regs.edx,
        3 => &mut regs.esi,
        4 => &mut regs.edi,
        5 => &mut regs.ebp,
        6 => &mut regs.eax,
        7 => &mut regs.xds,
        8 => &mut regs.xes,
        9 => &mut regs.xfs,
        10 => &mut regs.xgs,
        11 => &mut regs.orig_eax,
        _ => return None,
    })
}

#[cfg(target_arch = "x86")]
fn load_word(regs: &mut user_regs_struct, index: usize) -> Option<u64> {
    slot(regs, index).map(|w| u64::from(*w as u32))
}

#[cfg(target_arch = "x86")]
fn store_word(regs: &mut user_regs_struct, index: usize, value: u64) -> bool {
    slot(regs, index)
        .map(|w| *w = value as u32 as nix::libc::c_long)
        .is_some()
}
