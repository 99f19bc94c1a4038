//! In-memory process control for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use nix::errno::Errno;

use super::{ProcessControl, TaskSession};
use crate::error::{Error, Result};
use crate::registers::{Arch, RegisterSnapshot, RegisterTable};

/// How a mock process reacts to a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBehavior {
    /// Reported stopped on the first probe.
    Immediate,
    /// Reported stopped after this many probes.
    AfterProbes(u32),
    /// Never reported stopped.
    Never,
}

/// Everything the engine asked the mock to do, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockEvent {
    Stop(i32),
    Continue(i32),
    Attach(i32),
    WriteRegisters(i32),
    Detach(i32),
}

#[derive(Debug, Clone)]
pub struct MockProcess {
    pub registers: RegisterSnapshot,
    pub stop_behavior: StopBehavior,
    pub zombie: bool,
    pub stop_fails: bool,
    pub continue_fails: bool,
    pub attach_fails: bool,
    /// Disappear once stopped, before anyone attaches.
    pub exits_after_stop: bool,
    stop_requested: bool,
    stopped: bool,
    probes: u32,
}

impl MockProcess {
    /// A process that stops promptly, with register `i` holding `i * 0x1111`.
    pub fn responsive(arch: Arch) -> Self {
        let table = RegisterTable::for_arch(arch);
        let words = (0..table.reg_count() as u64).map(|i| i * 0x1111).collect();
        Self {
            registers: RegisterSnapshot::new(words, table.word_bits()),
            stop_behavior: StopBehavior::Immediate,
            zombie: false,
            stop_fails: false,
            continue_fails: false,
            attach_fails: false,
            exits_after_stop: false,
            stop_requested: false,
            stopped: false,
            probes: 0,
        }
    }

    pub fn stop_behavior(mut self, behavior: StopBehavior) -> Self {
        self.stop_behavior = behavior;
        self
    }

    pub fn zombie(mut self) -> Self {
        self.zombie = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.stop_fails = true;
        self
    }

    pub fn failing_continue(mut self) -> Self {
        self.continue_fails = true;
        self
    }

    pub fn failing_attach(mut self) -> Self {
        self.attach_fails = true;
        self
    }

    pub fn exiting_after_stop(mut self) -> Self {
        self.exits_after_stop = true;
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    processes: HashMap<i32, MockProcess>,
    events: Vec<MockEvent>,
}

#[derive(Debug)]
pub struct MockProcessControl {
    arch: Arch,
    state: Mutex<MockState>,
}

impl MockProcessControl {
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_process(self, pid: i32, process: MockProcess) -> Self {
        self.state.lock().unwrap().processes.insert(pid, process);
        self
    }

    pub fn registers(&self, pid: i32) -> RegisterSnapshot {
        self.state.lock().unwrap().processes[&pid].registers.clone()
    }

    pub fn is_running(&self, pid: i32) -> bool {
        let state = self.state.lock().unwrap();
        state.processes.get(&pid).is_some_and(|p| !p.stopped)
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn write_count(&self, pid: i32) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == MockEvent::WriteRegisters(pid))
            .count()
    }
}

impl ProcessControl for MockProcessControl {
    fn arch(&self) -> Arch {
        self.arch
    }

    fn locate(&self, pid: i32) -> Result<()> {
        let state = self.state.lock().unwrap();
        match state.processes.get(&pid) {
            None => Err(Error::ProcessNotFound(pid)),
            Some(p) if p.zombie => Err(Error::unavailable(pid, "process is zombie")),
            Some(_) => Ok(()),
        }
    }

    fn request_stop(&self, pid: i32) -> std::result::Result<(), Errno> {
        let mut state = self.state.lock().unwrap();
        state.events.push(MockEvent::Stop(pid));
        let process = state.processes.get_mut(&pid).ok_or(Errno::ESRCH)?;
        if process.stop_fails {
            return Err(Errno::EPERM);
        }
        process.stop_requested = true;
        Ok(())
    }

    fn is_stopped(&self, pid: i32) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let process = state
            .processes
            .get_mut(&pid)
            .ok_or(Error::ProcessNotFound(pid))?;
        if process.stop_requested && !process.stopped {
            process.probes += 1;
            process.stopped = match process.stop_behavior {
                StopBehavior::Immediate => true,
                StopBehavior::AfterProbes(n) => process.probes >= n,
                StopBehavior::Never => false,
            };
        }
        Ok(process.stopped)
    }

    fn request_continue(&self, pid: i32) -> std::result::Result<(), Errno> {
        let mut state = self.state.lock().unwrap();
        state.events.push(MockEvent::Continue(pid));
        let process = state.processes.get_mut(&pid).ok_or(Errno::ESRCH)?;
        if process.continue_fails {
            return Err(Errno::EPERM);
        }
        process.stop_requested = false;
        process.stopped = false;
        process.probes = 0;
        Ok(())
    }

    fn attach(&self, pid: i32) -> Result<Box<dyn TaskSession + '_>> {
        let mut state = self.state.lock().unwrap();
        state.events.push(MockEvent::Attach(pid));
        let (exits, refused) = state
            .processes
            .get(&pid)
            .map(|p| (p.exits_after_stop, p.attach_fails || !p.stopped))
            .ok_or_else(|| Error::unavailable(pid, "process exited"))?;
        if exits {
            state.processes.remove(&pid);
            return Err(Error::unavailable(pid, "process exited before attach"));
        }
        if refused {
            return Err(Error::unavailable(pid, "attach refused"));
        }
        Ok(Box::new(MockSession { control: self, pid }))
    }
}

struct MockSession<'a> {
    control: &'a MockProcessControl,
    pid: i32,
}

impl TaskSession for MockSession<'_> {
    fn read_registers(&mut self) -> Result<RegisterSnapshot> {
        let state = self.control.state.lock().unwrap();
        state
            .processes
            .get(&self.pid)
            .map(|p| p.registers.clone())
            .ok_or_else(|| Error::unavailable(self.pid, "process exited"))
    }

    fn write_registers(&mut self, snapshot: &RegisterSnapshot) -> Result<()> {
        let mut state = self.control.state.lock().unwrap();
        state.events.push(MockEvent::WriteRegisters(self.pid));
        let process = state
            .processes
            .get_mut(&self.pid)
            .ok_or_else(|| Error::unavailable(self.pid, "process exited"))?;
        process.registers = snapshot.clone();
        Ok(())
    }
}

impl Drop for MockSession<'_> {
    fn drop(&mut self) {
        let mut state = self.control.state.lock().unwrap();
        state.events.push(MockEvent::Detach(self.pid));
    }
}
