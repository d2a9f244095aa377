//! Pseudo-random target selection.
//!
//! [`Xorshift128`] is Marsaglia's four-word xorshift generator (period 2^128 - 1
//! over non-zero states). It is not cryptographic; it only has to be fast and
//! spread targets evenly over the address space. [`AddressGenerator`] draws from
//! it and throws away anything the [`ExclusionTable`] rejects.
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::exclusion::ExclusionTable;

/// Substitute for the all-zero state, which the recurrence never leaves.
const FALLBACK_STATE: [u32; 4] = [123_456_789, 362_436_069, 521_288_629, 88_675_123];

/// Four-word xorshift state `(x, y, z, w)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xorshift128 {
    x: u32,
    y: u32,
    z: u32,
    w: u32,
}

impl Xorshift128 {
    /// Uses `state` as `[x, y, z, w]`. An all-zero state is swapped for a fixed
    /// non-zero one.
    pub fn with_state(state: [u32; 4]) -> Self {
        let [x, y, z, w] = if state == [0; 4] { FALLBACK_STATE } else { state };
        Self { x, y, z, w }
    }

    /// Expands a 64-bit seed into a full state.
    pub fn from_seed(seed: u64) -> Self {
        let lo = seed as u32;
        let hi = (seed >> 32) as u32;
        Self::with_state([lo, hi, lo ^ 0x9E37_79B9, hi ^ 0x7F4A_7C15])
    }

    /// Seeds from wall-clock seconds and the sub-second clock.
    pub fn from_clock() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let secs = now.as_secs() as u32;
        let ticks = now.subsec_nanos();
        let y = secs.rotate_left(16) ^ ticks;
        Self::with_state([secs, y, ticks, ticks ^ y])
    }

    /// Current state as `[x, y, z, w]`.
    pub fn state(&self) -> [u32; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Advances the state and returns the new newest word.
    #[inline]
    pub fn next_value(&mut self) -> u32 {
        let mut t = self.x;
        t ^= t << 11;
        t ^= t >> 8;
        self.x = self.y;
        self.y = self.z;
        self.z = self.w;
        self.w ^= self.w >> 19;
        self.w ^= t;
        self.w
    }
}

/// Endless source of probe targets.
///
/// ```rust
/// # use randsweep::generator::AddressGenerator;
/// # use randsweep::exclusion::{is_reserved, ExclusionTable};
/// let mut generator = AddressGenerator::from_seed(7, ExclusionTable::reserved());
/// for addr in generator.by_ref().take(100) {
///     assert!(!is_reserved(addr));
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AddressGenerator {
    rng: Xorshift128,
    exclusions: ExclusionTable,
}

impl AddressGenerator {
    /// Clock-seeded generator. Runs are not reproducible.
    pub fn new(exclusions: ExclusionTable) -> Self {
        Self::with_rng(Xorshift128::from_clock(), exclusions)
    }

    /// Reproducible generator: equal seeds give equal address sequences.
    pub fn from_seed(seed: u64, exclusions: ExclusionTable) -> Self {
        Self::with_rng(Xorshift128::from_seed(seed), exclusions)
    }

    pub fn with_rng(rng: Xorshift128, exclusions: ExclusionTable) -> Self {
        Self { rng, exclusions }
    }

    /// Raw 32-bit draw, before any filtering.
    #[inline]
    pub fn next_value(&mut self) -> u32 {
        self.rng.next_value()
    }

    /// Draws until a value lands outside every excluded block.
    ///
    /// The low byte of a draw becomes the first octet. Loops until a draw is
    /// accepted, with no retry cap.
    pub fn next_address(&mut self) -> Ipv4Addr {
        loop {
            let addr = Ipv4Addr::from(self.next_value().to_le_bytes());
            if !self.exclusions.is_excluded(addr) {
                return addr;
            }
        }
    }
}

impl Iterator for AddressGenerator {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusion::is_reserved;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn recurrence_matches_reference_values() {
        let mut rng = Xorshift128::with_state([1, 2, 3, 4]);
        assert_eq!(rng.next_value(), 0x080D);
        assert_eq!(rng.next_value(), 0x181F);
        assert_eq!(rng.state(), [3, 4, 0x080D, 0x181F]);
    }

    #[test]
    fn zero_state_is_replaced() {
        let mut rng = Xorshift128::with_state([0; 4]);
        assert_eq!(rng.state(), FALLBACK_STATE);
        assert_ne!(rng.next_value(), 0);
    }

    #[test]
    fn seeds_never_produce_zero_state() {
        assert_ne!(Xorshift128::from_seed(0).state(), [0; 4]);
        assert_ne!(Xorshift128::from_clock().state(), [0; 4]);
    }

    #[test]
    fn low_byte_is_first_octet() {
        let mut generator =
            AddressGenerator::with_rng(Xorshift128::with_state([1, 2, 3, 4]), ExclusionTable::reserved());
        // 0x0000080D
        assert_eq!(generator.next_address(), Ipv4Addr::new(13, 8, 0, 0));
    }

    #[test]
    fn excluded_draws_are_skipped() {
        let exclusions = ExclusionTable::with_extra(["13.0.0.0/8"]).unwrap();
        let mut generator =
            AddressGenerator::with_rng(Xorshift128::with_state([1, 2, 3, 4]), exclusions);
        // 0x080D is rejected, 0x181F comes next.
        assert_eq!(generator.next_address(), Ipv4Addr::new(31, 24, 0, 0));
    }

    #[test]
    fn one_free_block_is_still_found() {
        let exclusions = ExclusionTable::with_extra([
            "2.0.0.0/7", "4.0.0.0/6", "8.0.0.0/5", "16.0.0.0/4", "32.0.0.0/3", "64.0.0.0/2",
            "128.0.0.0/1",
        ])
        .unwrap();
        let generator = AddressGenerator::from_seed(3, exclusions);
        assert!(generator.take(50).all(|addr| addr.octets()[0] == 1));
    }

    #[test]
    fn equal_seeds_give_equal_sequences() {
        let mut seeds = StdRng::seed_from_u64(0x5eed);
        for _ in 0..20 {
            let seed: u64 = seeds.random();
            let a = AddressGenerator::from_seed(seed, ExclusionTable::reserved());
            let b = AddressGenerator::from_seed(seed, ExclusionTable::reserved());
            assert!(a.take(500).eq(b.take(500)));
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let a = AddressGenerator::from_seed(1, ExclusionTable::reserved());
        let b = AddressGenerator::from_seed(2, ExclusionTable::reserved());
        assert!(!a.take(16).eq(b.take(16)));
    }

    #[test]
    fn generated_addresses_avoid_reserved_space() {
        let mut seeds = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            let generator = AddressGenerator::from_seed(seeds.random(), ExclusionTable::reserved());
            for addr in generator.take(10_000) {
                assert!(!is_reserved(addr), "{addr} is reserved");
            }
        }
    }

    #[test]
    fn siblings_of_reserved_blocks_still_come_out() {
        // Guards against filtering whole first octets: 172.x and 192.x outside
        // the reserved blocks must show up in a long enough run.
        let generator = AddressGenerator::from_seed(99, ExclusionTable::reserved());
        let (mut saw_172, mut saw_192) = (false, false);
        for addr in generator.take(200_000) {
            match addr.octets()[0] {
                172 => saw_172 = true,
                192 => saw_192 = true,
                _ => {}
            }
        }
        assert!(saw_172 && saw_192);
    }
}
