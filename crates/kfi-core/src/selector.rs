//! Register and bit selection.
//!
//! Explicit selectors are used when they fall inside the table; anything
//! unset or out of range is replaced by a uniform random draw. The default
//! source is the OS CSPRNG so unspecified injections cannot be replayed.

use rand::Rng;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::registers::RegisterTable;

/// Final register and bit to flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultTarget {
    pub register: usize,
    pub bit: u32,
}

/// A target plus which parts of it were drawn at random.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub target: FaultTarget,
    pub random_register: bool,
    pub random_bit: bool,
}

pub struct FaultSelector<R = OsRng> {
    rng: R,
}

impl FaultSelector<OsRng> {
    pub fn new() -> Self {
        Self { rng: OsRng }
    }
}

impl Default for FaultSelector<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore> FaultSelector<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn select(
        &mut self,
        table: &RegisterTable,
        register: Option<i64>,
        bit: Option<i64>,
    ) -> Selection {
        let reg_count = table.reg_count() as u64;
        let word_bits = u64::from(table.word_bits());

        let (register, random_register) = match within(register, reg_count) {
            Some(r) => (r, false),
            None => (self.rng.gen_range(0..reg_count), true),
        };
        let (bit, random_bit) = match within(bit, word_bits) {
            Some(b) => (b, false),
            None => (self.rng.gen_range(0..word_bits), true),
        };

        Selection {
            target: FaultTarget {
                register: register as usize,
                bit: bit as u32,
            },
            random_register,
            random_bit,
        }
    }
}

fn within(value: Option<i64>, bound: u64) -> Option<u64> {
    value
        .and_then(|v| u64::try_from(v).ok())
        .filter(|v| *v < bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{X86_64_REGISTERS, X86_REGISTERS};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn seeded() -> FaultSelector<ChaCha20Rng> {
        FaultSelector::with_rng(ChaCha20Rng::seed_from_u64(42))
    }

    /// Every bucket must land within 25% of the expected count.
    fn assert_roughly_uniform(counts: &[u32], trials: u32) {
        let expected = f64::from(trials) / counts.len() as f64;
        for (i, &c) in counts.iter().enumerate() {
            let deviation = (f64::from(c) - expected).abs() / expected;
            assert!(
                deviation < 0.25,
                "bucket {i} has {c} hits, expected about {expected}"
            );
        }
    }

    #[test]
    fn test_explicit_values_are_kept() {
        let mut selector = seeded();
        let sel = selector.select(&X86_64_REGISTERS, Some(5), Some(3));
        assert_eq!(sel.target, FaultTarget { register: 5, bit: 3 });
        assert!(!sel.random_register);
        assert!(!sel.random_bit);
    }

    #[test]
    fn test_out_of_range_register_falls_back() {
        let mut selector = seeded();
        for register in [16, 999, -1, i64::MIN, i64::MAX] {
            let sel = selector.select(&X86_64_REGISTERS, Some(register), Some(3));
            assert!(sel.random_register);
            assert!(sel.target.register < 16);
            assert_eq!(sel.target.bit, 3);
        }
    }

    #[test]
    fn test_out_of_range_bit_falls_back() {
        let mut selector = seeded();
        for bit in [32, 64, -1] {
            let sel = selector.select(&X86_REGISTERS, Some(2), Some(bit));
            assert!(sel.random_bit);
            assert!(sel.target.bit < 32);
            assert_eq!(sel.target.register, 2);
        }
    }

    #[test]
    fn test_random_register_is_uniform() {
        let mut selector = seeded();
        let trials = 32_000;
        let mut counts = [0u32; 16];
        for _ in 0..trials {
            let sel = selector.select(&X86_64_REGISTERS, None, Some(0));
            counts[sel.target.register] += 1;
        }
        assert_roughly_uniform(&counts, trials);
    }

    #[test]
    fn test_random_bit_is_uniform() {
        let mut selector = seeded();
        let trials = 64_000;
        let mut counts = [0u32; 64];
        for _ in 0..trials {
            let sel = selector.select(&X86_64_REGISTERS, Some(0), None);
            counts[sel.target.bit as usize] += 1;
        }
        assert_roughly_uniform(&counts, trials);
    }

    #[test]
    fn test_os_rng_stays_in_range() {
        let mut selector = FaultSelector::new();
        for _ in 0..1000 {
            let sel = selector.select(&X86_REGISTERS, None, None);
            assert!(sel.target.register < 12);
            assert!(sel.target.bit < 32);
        }
    }
}
