// Deterministic, portable pseudo-random streams for the composer.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding,
// plus the small set of choice helpers every composition stage needs:
// Bernoulli draws, uniform integer ranges, uniform element choice, and
// cumulative-weight selection over `(item, weight)` tables.
//
// Each pipeline stage owns one `ScoreRng`, created from `base_seed + offset`
// via `for_stage`. Sub-stages that need an independent stream derive it with
// `fork`, which consumes one value from the parent. Nothing here reads global
// state, so two runs with the same seed draw identical values.
//
// **Critical constraint: determinism.** Every method must produce identical
// output given the same prior state, regardless of platform, compiler version,
// or optimization level. The core generator is integer-only; the float helpers
// only scale integer output.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ stream, the composer's only source of randomness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreRng {
    s: [u64; 4],
}

impl ScoreRng {
    /// Create a new stream seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Stream for a pipeline stage: seeded with `base_seed + offset`
    /// (wrapping), so each stage sees its own sequence for a given song seed.
    pub fn for_stage(base_seed: u64, offset: u64) -> Self {
        Self::new(base_seed.wrapping_add(offset))
    }

    /// Derive an independent child stream. Advances `self` by one draw.
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u64())
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a `u32` by taking the upper 32 bits of a `u64`.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Generate a uniform `f64` in [0, 1) from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range; // = (2^64 - range) % range
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `usize` in `[low, high)`.
    ///
    /// Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Generate a uniform random `i32` in `[low, high]` (inclusive on both ends).
    ///
    /// Panics if `low > high`.
    pub fn range_i32_inclusive(&mut self, low: i32, high: i32) -> i32 {
        assert!(low <= high, "range_i32_inclusive: low must be <= high");
        let span = (high as i64 - low as i64) as u64 + 1;
        (low as i64 + self.range_u64(0, span) as i64) as i32
    }

    /// Return `true` with probability `p`.
    ///
    /// `p <= 0.0` always returns false, `p >= 1.0` always returns true.
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniformly choose one element, or `None` for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let i = self.range_usize(0, items.len());
        items.get(i)
    }

    /// Cumulative-weight index selection.
    ///
    /// Draws `r` uniformly in `[0, total)` and returns the first index whose
    /// running sum reaches `r`. A non-positive total is treated as 1.0, and a
    /// draw that walks off the end (rounding, or all-zero weights) lands on
    /// the last index. Returns `None` only for an empty slice. Always consumes
    /// exactly one draw when non-empty.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        if weights.is_empty() {
            return None;
        }
        let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
        let total = if total > 0.0 { total } else { 1.0 };
        let r = self.next_f64() * total;
        let mut acc = 0.0;
        for (i, w) in weights.iter().enumerate() {
            acc += w.max(0.0);
            if r <= acc {
                return Some(i);
            }
        }
        Some(weights.len() - 1)
    }

    /// Weighted choice over a slice of `(item, weight)` pairs.
    pub fn pick_weighted<'a, T>(&mut self, items: &'a [(T, f64)]) -> Option<&'a T> {
        let weights: Vec<f64> = items.iter().map(|(_, w)| *w).collect();
        self.weighted_index(&weights)
            .and_then(|i| items.get(i))
            .map(|(item, _)| item)
    }

    /// Weighted choice over a fixed, non-empty table of `Copy` items.
    pub fn pick_from<T: Copy, const N: usize>(&mut self, table: &[(T, f64); N]) -> T {
        const { assert!(N > 0, "pick_from needs a non-empty table") };
        match self.pick_weighted(table) {
            Some(item) => *item,
            None => table[N - 1].0,
        }
    }
}

/// SplitMix64, used only for seeding xoshiro256++ from a single `u64`.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed_same_output() {
        let mut a = ScoreRng::new(42);
        let mut b = ScoreRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_different_output() {
        let mut a = ScoreRng::new(42);
        let mut b = ScoreRng::new(43);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn stage_streams_are_offset_seeds() {
        let mut stage = ScoreRng::for_stage(1000, 303);
        let mut plain = ScoreRng::new(1303);
        assert_eq!(stage.next_u64(), plain.next_u64());

        // Wrapping at the top of the seed space must not panic.
        let mut wrapped = ScoreRng::for_stage(u64::MAX, 2);
        let mut one = ScoreRng::new(1);
        assert_eq!(wrapped.next_u64(), one.next_u64());
    }

    #[test]
    fn fork_is_deterministic_and_advances_parent() {
        let mut a = ScoreRng::new(7);
        let mut b = ScoreRng::new(7);
        let mut child_a = a.fork();
        let mut child_b = b.fork();
        assert_eq!(child_a.next_u64(), child_b.next_u64());
        assert_eq!(a.next_u64(), b.next_u64());

        let mut fresh = ScoreRng::new(7);
        fresh.next_u64();
        let mut parent = ScoreRng::new(7);
        parent.fork();
        assert_eq!(fresh.next_u64(), parent.next_u64());
    }

    #[test]
    fn f64_in_unit_range() {
        let mut rng = ScoreRng::new(12345);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "f64 out of range: {v}");
        }
    }

    #[test]
    fn range_u64_within_bounds() {
        let mut rng = ScoreRng::new(999);
        for _ in 0..10_000 {
            let v = rng.range_u64(10, 20);
            assert!((10..20).contains(&v), "range_u64 out of range: {v}");
        }
    }

    #[test]
    fn range_i32_inclusive_reaches_both_ends() {
        let mut rng = ScoreRng::new(666);
        let mut saw_low = false;
        let mut saw_high = false;
        for _ in 0..10_000 {
            let v = rng.range_i32_inclusive(-3, 3);
            assert!((-3..=3).contains(&v), "range_i32_inclusive out of range: {v}");
            saw_low |= v == -3;
            saw_high |= v == 3;
        }
        assert!(saw_low && saw_high);
        assert_eq!(rng.range_i32_inclusive(5, 5), 5);
    }

    #[test]
    fn random_bool_distribution() {
        let mut rng = ScoreRng::new(42);
        let n = 10_000;
        let true_count = (0..n).filter(|_| rng.random_bool(0.5)).count();
        let pct = true_count as f64 / n as f64;
        assert!(
            (0.45..0.55).contains(&pct),
            "random_bool(0.5) should be ~50%, got {:.1}%",
            pct * 100.0
        );
    }

    #[test]
    fn random_bool_extremes() {
        let mut rng = ScoreRng::new(42);
        for _ in 0..100 {
            assert!(!rng.random_bool(0.0));
            assert!(rng.random_bool(1.0));
        }
    }

    #[test]
    fn choose_empty_and_nonempty() {
        let mut rng = ScoreRng::new(3);
        let empty: [u8; 0] = [];
        assert!(rng.choose(&empty).is_none());
        let items = [4, 8, 15];
        for _ in 0..100 {
            let v = *rng.choose(&items).unwrap();
            assert!(items.contains(&v));
        }
    }

    #[test]
    fn weighted_index_respects_zero_weights() {
        let mut rng = ScoreRng::new(11);
        for _ in 0..1000 {
            let i = rng.weighted_index(&[0.0, 1.0, 0.0]).unwrap();
            assert_eq!(i, 1);
        }
        assert_eq!(rng.weighted_index(&[]), None);
    }

    #[test]
    fn weighted_index_all_zero_falls_to_last() {
        let mut rng = ScoreRng::new(5);
        // Total is treated as 1.0 and nothing accumulates, so every draw
        // walks off the end.
        for _ in 0..100 {
            assert_eq!(rng.weighted_index(&[0.0, 0.0, 0.0]), Some(2));
        }
    }

    #[test]
    fn pick_from_follows_weights() {
        let mut rng = ScoreRng::new(2024);
        let table = [('a', 0.9), ('b', 0.1)];
        let n = 10_000;
        let a_count = (0..n).filter(|_| rng.pick_from(&table) == 'a').count();
        let pct = a_count as f64 / n as f64;
        assert!((0.86..0.94).contains(&pct), "expected ~90% 'a', got {pct}");
    }

    #[test]
    fn serialization_roundtrip() {
        let mut rng = ScoreRng::new(42);
        for _ in 0..100 {
            rng.next_u64();
        }
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: ScoreRng = serde_json::from_str(&json).unwrap();
        for _ in 0..100 {
            assert_eq!(rng.next_u64(), restored.next_u64());
        }
    }
}
