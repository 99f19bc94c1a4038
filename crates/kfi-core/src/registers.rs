//! Register tables and saved register snapshots.
//!
//! The table order follows the kernel's saved-register layout for each
//! architecture, so index `n` always names the same machine word.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Instruction set architectures with a register table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    Display,
)]
pub enum Arch {
    #[strum(serialize = "x86_64")]
    #[serde(rename = "x86_64")]
    X86_64,
    #[strum(serialize = "x86")]
    #[serde(rename = "x86")]
    X86,
}

impl Arch {
    /// Architecture of the build target, if it has a table.
    pub fn host() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Self::X86_64)
        } else if cfg!(target_arch = "x86") {
            Some(Self::X86)
        } else {
            None
        }
    }
}

/// Ordered register names plus the machine word width.
#[derive(Debug, PartialEq, Eq)]
pub struct RegisterTable {
    arch: Arch,
    names: &'static [&'static str],
    word_bits: u32,
}

pub static X86_64_REGISTERS: RegisterTable = RegisterTable {
    arch: Arch::X86_64,
    names: &[
        "r15", "r14", "r13", "r12", "rbp", "rbx", "r11", "r10", "r9", "r8", "rax", "rcx", "rdx",
        "rsi", "rdi", "orig_rax",
    ],
    word_bits: 64,
};

pub static X86_REGISTERS: RegisterTable = RegisterTable {
    arch: Arch::X86,
    names: &[
        "ebx", "ecx", "edx", "esi", "edi", "ebp", "eax", "ds", "es", "fs", "gs", "orig_eax",
    ],
    word_bits: 32,
};

impl RegisterTable {
    pub fn for_arch(arch: Arch) -> &'static RegisterTable {
        match arch {
            Arch::X86_64 => &X86_64_REGISTERS,
            Arch::X86 => &X86_REGISTERS,
        }
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn reg_count(&self) -> usize {
        self.names.len()
    }

    pub fn word_bits(&self) -> u32 {
        self.word_bits
    }

    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.names.get(index).copied()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| *n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = (usize, &'static str)> + '_ {
        self.names.iter().copied().enumerate()
    }

    /// A snapshot of all-zero words sized for this table.
    pub fn zeroed_snapshot(&self) -> RegisterSnapshot {
        RegisterSnapshot::new(vec![0; self.reg_count()], self.word_bits)
    }
}

/// Copy of a stopped task's saved register words.
///
/// Words are stored as `u64` and masked to the table's word width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSnapshot {
    words: Vec<u64>,
    word_bits: u32,
}

impl RegisterSnapshot {
    pub fn new(words: Vec<u64>, word_bits: u32) -> Self {
        let mask = word_mask(word_bits);
        Self {
            words: words.into_iter().map(|w| w & mask).collect(),
            word_bits,
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn word_bits(&self) -> u32 {
        self.word_bits
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        self.words.get(index).copied()
    }

    /// Returns `false` if `index` is out of range.
    pub fn set(&mut self, index: usize, value: u64) -> bool {
        let mask = word_mask(self.word_bits);
        match self.words.get_mut(index) {
            Some(word) => {
                *word = value & mask;
                true
            }
            None => false,
        }
    }

    /// XOR one bit of one word. Returns `(before, after)`, or `None` when
    /// either index is out of range.
    pub fn toggle_bit(&mut self, index: usize, bit: u32) -> Option<(u64, u64)> {
        if bit >= self.word_bits {
            return None;
        }
        let word = self.words.get_mut(index)?;
        let before = *word;
        *word ^= 1u64 << bit;
        Some((before, *word))
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }
}

fn word_mask(word_bits: u32) -> u64 {
    if word_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << word_bits) - 1
    }
}
