//! Flip one bit in a stopped task's saved registers.

use tracing::debug;

use crate::error::{Error, Result};
use crate::process::ProcessControl;
use crate::selector::FaultTarget;
use crate::suspend::Suspended;

/// Register word before and after the flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
    pub target: FaultTarget,
    pub before: u64,
    pub after: u64,
}

/// XOR `1 << bit` into the target register of a suspended process.
///
/// The attach session revalidates the task and holds it for the whole
/// read-modify-write; any failure there is `TaskUnavailable`.
pub fn flip_bit<C>(control: &C, suspended: &Suspended, target: FaultTarget) -> Result<Mutation>
where
    C: ProcessControl + ?Sized,
{
    let pid = suspended.pid();
    let mut session = control.attach(pid)?;

    let mut snapshot = session.read_registers()?;
    let (before, after) = snapshot
        .toggle_bit(target.register, target.bit)
        .ok_or_else(|| {
            Error::unavailable(
                pid,
                format!(
                    "register {} bit {} outside snapshot of {} words",
                    target.register,
                    target.bit,
                    snapshot.len()
                ),
            )
        })?;
    session.write_registers(&snapshot)?;
    drop(session);

    debug!(
        "Process {} register {}: {:#x} -> {:#x}",
        pid, target.register, before, after
    );
    Ok(Mutation {
        target,
        before,
        after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{MockEvent, MockProcess, MockProcessControl};
    use crate::registers::Arch;
    use crate::suspend::SuspensionController;
    use std::time::Duration;

    fn suspended(control: &MockProcessControl, pid: i32) -> Suspended {
        SuspensionController::new(Duration::from_millis(5), Duration::from_micros(100))
            .suspend(control, pid)
            .unwrap()
    }

    #[test]
    fn test_flip_changes_exactly_one_bit() {
        let control = MockProcessControl::new(Arch::X86_64)
            .with_process(1, MockProcess::responsive(Arch::X86_64));
        let original = control.registers(1);
        let token = suspended(&control, 1);

        let mutation = flip_bit(&control, &token, FaultTarget { register: 5, bit: 3 }).unwrap();
        assert_eq!(mutation.before, 5 * 0x1111);
        assert_eq!(mutation.after, (5 * 0x1111) ^ 0b1000);

        let flipped = control.registers(1);
        for (i, (a, b)) in original.words().iter().zip(flipped.words()).enumerate() {
            let diff = (a ^ b).count_ones();
            assert_eq!(diff, u32::from(i == 5), "register {i}");
        }
        assert_eq!(
            control.events(),
            vec![
                MockEvent::Stop(1),
                MockEvent::Attach(1),
                MockEvent::WriteRegisters(1),
                MockEvent::Detach(1),
            ]
        );
    }

    #[test]
    fn test_attach_failure_is_task_unavailable() {
        let control = MockProcessControl::new(Arch::X86_64)
            .with_process(1, MockProcess::responsive(Arch::X86_64).failing_attach());
        let token = suspended(&control, 1);
        let err = flip_bit(&control, &token, FaultTarget { register: 0, bit: 0 }).unwrap_err();
        assert!(matches!(err, Error::TaskUnavailable { pid: 1, .. }));
        assert_eq!(control.write_count(1), 0);
    }

    #[test]
    fn test_out_of_snapshot_target_writes_nothing() {
        let control = MockProcessControl::new(Arch::X86)
            .with_process(1, MockProcess::responsive(Arch::X86));
        let token = suspended(&control, 1);
        let err = flip_bit(&control, &token, FaultTarget { register: 12, bit: 0 }).unwrap_err();
        assert!(matches!(err, Error::TaskUnavailable { .. }));
        assert_eq!(control.write_count(1), 0);
    }
}
