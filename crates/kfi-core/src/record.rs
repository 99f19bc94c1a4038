//! The last injection performed by an injector.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::registers::RegisterTable;

/// One committed injection: which process, register and bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionRecord {
    pub pid: i32,
    pub register: usize,
    pub register_name: &'static str,
    pub bit: u32,
}

impl InjectionRecord {
    /// Zero-valued record reported before any injection happened.
    pub fn initial(table: &RegisterTable) -> Self {
        Self {
            pid: 0,
            register: 0,
            register_name: table.name(0).unwrap_or("?"),
            bit: 0,
        }
    }
}

impl fmt::Display for InjectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Injected process {}, register {}, bit {}",
            self.pid, self.register_name, self.bit
        )
    }
}

/// Mutex-guarded slot holding the most recent injection.
#[derive(Debug)]
pub struct LastInjection {
    slot: Mutex<InjectionRecord>,
}

impl LastInjection {
    pub fn new(table: &RegisterTable) -> Self {
        Self {
            slot: Mutex::new(InjectionRecord::initial(table)),
        }
    }

    pub fn store(&self, record: InjectionRecord) {
        // The record is plain data, a poisoned lock still holds a valid value
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = record;
    }

    pub fn load(&self) -> InjectionRecord {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{X86_64_REGISTERS, X86_REGISTERS};

    #[test]
    fn test_initial_report() {
        let last = LastInjection::new(&X86_64_REGISTERS);
        assert_eq!(
            last.load().to_string(),
            "Injected process 0, register r15, bit 0"
        );

        let last = LastInjection::new(&X86_REGISTERS);
        assert_eq!(last.load().register_name, "ebx");
    }

    #[test]
    fn test_store_overwrites() {
        let last = LastInjection::new(&X86_64_REGISTERS);
        last.store(InjectionRecord {
            pid: 4321,
            register: 5,
            register_name: "rbx",
            bit: 3,
        });
        last.store(InjectionRecord {
            pid: 99,
            register: 10,
            register_name: "rax",
            bit: 63,
        });
        assert_eq!(
            last.load().to_string(),
            "Injected process 99, register rax, bit 63"
        );
    }
}
