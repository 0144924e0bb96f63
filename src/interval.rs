//! Randomized boost interval generation.
//!
//! Boost cadence is jittered to avoid a synchronized, detectable request
//! pattern: a whole-minute count drawn uniformly from the configured range
//! plus an independent second offset in [0, 59].

use std::time::Duration;

use rand::Rng;

/// Generates bounded random intervals between boosts.
///
/// Stateless; safe to call from any number of concurrent tasks.
#[derive(Debug, Clone, Copy)]
pub struct IntervalGenerator {
    min_minutes: u64,
    max_minutes: u64,
}

impl IntervalGenerator {
    /// Create a generator for the closed minute range `[min_minutes, max_minutes]`.
    ///
    /// A range with `max < min` collapses to `min`.
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            max_minutes: max_minutes.max(min_minutes),
        }
    }

    /// Lower bound of generated intervals, in seconds.
    pub fn min_seconds(&self) -> u64 {
        self.min_minutes * 60
    }

    /// Upper bound of generated intervals, in seconds (inclusive).
    pub fn max_seconds(&self) -> u64 {
        self.max_minutes * 60 + 59
    }

    /// Produce the next randomized interval.
    ///
    /// The result always satisfies
    /// `min_minutes * 60 <= secs <= max_minutes * 60 + 59`.  Out-of-range
    /// values are clamped into the bound, never re-sampled.
    pub fn next_interval(&self) -> Duration {
        let mut rng = rand::thread_rng();
        let minutes = rng.gen_range(self.min_minutes..=self.max_minutes);
        let seconds = rng.gen_range(0u64..=59);

        let total = (minutes * 60 + seconds).clamp(self.min_seconds(), self.max_seconds());
        Duration::from_secs(total)
    }

    /// Draw `n` intervals; used by the CLI preview.
    pub fn sample(&self, n: usize) -> Vec<Duration> {
        (0..n).map(|_| self.next_interval()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals_within_bound() {
        let gen = IntervalGenerator::new(13, 17);
        for _ in 0..1000 {
            let d = gen.next_interval().as_secs();
            assert!(d >= 13 * 60, "interval {d}s below lower bound");
            assert!(d <= 17 * 60 + 59, "interval {d}s above upper bound");
        }
    }

    #[test]
    fn test_degenerate_range_single_minute() {
        let gen = IntervalGenerator::new(15, 15);
        for _ in 0..100 {
            let d = gen.next_interval().as_secs();
            assert!((900..=959).contains(&d));
        }
    }

    #[test]
    fn test_inverted_range_collapses_to_min() {
        let gen = IntervalGenerator::new(17, 13);
        for _ in 0..100 {
            let d = gen.next_interval().as_secs();
            assert!((17 * 60..=17 * 60 + 59).contains(&d));
        }
    }

    #[test]
    fn test_seconds_offset_varies() {
        // With 200 draws the second offset should not be constant.
        let gen = IntervalGenerator::new(13, 17);
        let offsets: std::collections::HashSet<u64> =
            gen.sample(200).iter().map(|d| d.as_secs() % 60).collect();
        assert!(offsets.len() > 1, "second offset never varied");
    }

    #[test]
    fn test_sample_count() {
        let gen = IntervalGenerator::new(13, 17);
        assert_eq!(gen.sample(10).len(), 10);
    }
}
