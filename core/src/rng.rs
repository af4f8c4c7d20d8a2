//! Deterministic random number generation.
//!
//! RULE: Nothing in a generator may call any platform RNG.
//! All randomness flows through StreamRng instances derived
//! from the single master seed given on the command line.
//!
//! Each generator gets its own stream, seeded deterministically
//! from (master_seed XOR slot). This means:
//!   - Adding a new generator never changes existing generators' output.
//!   - Each dataset is fully reproducible in isolation.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use uuid::Builder;

/// A named, deterministic RNG for a single generator.
pub struct StreamRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// Create a stream from the master seed and a stable slot index.
    /// The index must never change once assigned.
    pub fn new(master_seed: u64, slot_index: u64) -> Self {
        let derived_seed = master_seed ^ (slot_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Roll an integer in [lo, hi], both ends inclusive.
    pub fn range_inclusive(&mut self, lo: i64, hi: i64) -> i64 {
        assert!(lo <= hi, "empty range {lo}..={hi}");
        let span = (hi - lo) as u64 + 1;
        lo + self.next_u64_below(span) as i64
    }

    /// Uniform pick from a non-empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        let index = self.next_u64_below(items.len() as u64) as usize;
        &items[index]
    }

    /// Lowercase hex identifier of `len` chars (max 32), taken from a
    /// UUID built out of this stream's bytes.
    pub fn hex_id(&mut self, len: usize) -> String {
        let mut bytes = [0u8; 16];
        self.inner.fill_bytes(&mut bytes);
        let uuid = Builder::from_random_bytes(bytes).into_uuid();
        let mut hex = uuid.simple().to_string();
        hex.truncate(len.min(32));
        hex
    }
}

/// Hands out one stream per generator, indexed by stable slot.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn for_stream(&self, slot: StreamSlot) -> StreamRng {
        StreamRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries. Append only.
/// Reordering changes every generator's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Funnel = 0,
    Retention = 1,
    // Add new generators here, append only.
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Funnel => "funnel",
            Self::Retention => "retention",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let bank = RngBank::new(12345);
        let mut a = bank.for_stream(StreamSlot::Funnel);
        let mut b = bank.for_stream(StreamSlot::Funnel);
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn slots_get_independent_streams() {
        let bank = RngBank::new(12345);
        let mut funnel = bank.for_stream(StreamSlot::Funnel);
        let mut retention = bank.for_stream(StreamSlot::Retention);
        let a: Vec<u64> = (0..8).map(|_| funnel.next_u64()).collect();
        let b: Vec<u64> = (0..8).map(|_| retention.next_u64()).collect();
        assert_ne!(a, b);
        assert_eq!(funnel.name, "funnel");
        assert_eq!(retention.name, "retention");
    }

    #[test]
    fn range_inclusive_hits_both_ends() {
        let mut rng = StreamRng::new(7, 0);
        let mut seen_lo = false;
        let mut seen_hi = false;
        for _ in 0..1_000 {
            let v = rng.range_inclusive(1, 5);
            assert!((1..=5).contains(&v), "{v} outside 1..=5");
            seen_lo |= v == 1;
            seen_hi |= v == 5;
        }
        assert!(seen_lo && seen_hi);
        assert_eq!(rng.range_inclusive(3, 3), 3);
    }

    #[test]
    fn unit_floats_stay_in_range() {
        let mut rng = StreamRng::new(99, 1);
        for _ in 0..10_000 {
            let f = rng.next_f64();
            assert!((0.0..1.0).contains(&f));
        }
        assert!(!rng.chance(0.0));
        assert!(rng.chance(1.0));
    }

    #[test]
    fn hex_ids_are_lowercase_hex_of_requested_length() {
        let mut rng = StreamRng::new(42, 0);
        let id = rng.hex_id(10);
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(rng.hex_id(64).len(), 32);
        assert_ne!(rng.hex_id(8), rng.hex_id(8));
    }
}
