//! Cached discrete Poisson sampling for offspring counts.
//!
//! Each distinct mean gets a 2048-bucket inverse-CDF table: bucket `j` holds
//! the value `k` such that a uniform draw over the filled buckets lands on `k`
//! with probability `round(pmf(k) * 2048) / filled`. Building a table is
//! O(buckets); every subsequent sample is a single uniform index.
//!
//! The cache is an ordinary owned value. The engine gives each worker thread
//! its own instance, so no locking is involved. Means above [`TABLE_LIMIT`]
//! are too spread out for a table and are sampled directly instead.

use fnv::FnvHasher;
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use std::hash::Hasher;

pub const BUCKETS: usize = 2048;
pub const CACHE_SLOTS: usize = 64;

/// Above this mean a table can no longer resolve the distribution's shape.
pub const TABLE_LIMIT: f64 = 4096.0;

// Below this mean the table is built by walking k from zero.
const DIRECT_WALK_LIMIT: f64 = 1000.0;
// Above it only k within this many standard deviations can earn a bucket.
const WALK_SIGMAS: f64 = 8.0;

#[derive(Debug, Clone)]
pub struct PoissonTable {
    key: u64,
    mean: f64,
    values: Vec<usize>,
}

impl PoissonTable {
    pub fn build(mean: f64) -> Self {
        let mut values = Vec::with_capacity(BUCKETS);
        let ln_lambda = mean.ln();

        let (mut k, last) = if mean > DIRECT_WALK_LIMIT {
            let spread = WALK_SIGMAS * mean.sqrt();
            (
                (mean - spread).floor().max(0.0) as usize,
                (mean + spread).ceil() as usize,
            )
        } else {
            (0, usize::MAX)
        };
        let mut ln_fact = ln_factorial(k);

        loop {
            let pmf = (k as f64 * ln_lambda - mean - ln_fact).exp();
            let count = (pmf * BUCKETS as f64).round() as usize;
            let take = count.min(BUCKETS - values.len());
            values.extend(std::iter::repeat(k).take(take));

            if values.len() >= BUCKETS || k >= last || (pmf == 0.0 && k as f64 > mean) {
                break;
            }
            k += 1;
            ln_fact += (k as f64).ln();
        }

        // Means so large that no single k earns a bucket.
        if values.is_empty() {
            values.push(mean.round() as usize);
        }

        Self {
            key: mean.to_bits(),
            mean,
            values,
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Number of buckets actually filled (at most [`BUCKETS`]).
    pub fn filled(&self) -> usize {
        self.values.len()
    }

    pub fn buckets(&self) -> &[usize] {
        &self.values
    }

    #[inline(always)]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.values[rng.gen_range(0..self.values.len())]
    }
}

/// `ln(k!)`, exact summation for small `k`, Stirling series above.
fn ln_factorial(k: usize) -> f64 {
    if k < 32 {
        return (2..=k).map(|i| (i as f64).ln()).sum();
    }
    let x = k as f64;
    x * x.ln() - x + 0.5 * (2.0 * std::f64::consts::PI * x).ln() + 1.0 / (12.0 * x)
        - 1.0 / (360.0 * x * x * x)
}

fn sample_direct<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> usize {
    match Poisson::new(mean) {
        Ok(dist) => {
            let k: f64 = dist.sample(rng);
            k as usize
        }
        Err(_) => mean.round() as usize,
    }
}

fn slot_for(key: u64) -> usize {
    let mut hasher = FnvHasher::default();
    hasher.write_u64(key);
    (hasher.finish() % CACHE_SLOTS as u64) as usize
}

#[derive(Debug, Clone)]
pub struct PoissonCache {
    slots: Vec<Option<PoissonTable>>,
    builds: usize,
}

impl Default for PoissonCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PoissonCache {
    pub fn new() -> Self {
        Self {
            slots: vec![None; CACHE_SLOTS],
            builds: 0,
        }
    }

    /// Draws a Poisson-distributed count with the given mean.
    ///
    /// Non-positive means (and NaN) return 0 without touching the cache.
    /// Means above [`TABLE_LIMIT`] bypass the cache.
    #[inline]
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R, mean: f64) -> usize {
        if !(mean > 0.0) {
            return 0;
        }
        if mean > TABLE_LIMIT {
            return sample_direct(rng, mean);
        }
        self.table(mean).sample(rng)
    }

    /// Returns the table for `mean`, building it (and evicting whatever shared
    /// the slot) on a miss.
    pub fn table(&mut self, mean: f64) -> &PoissonTable {
        let key = mean.to_bits();
        let entry = &mut self.slots[slot_for(key)];
        if !matches!(entry, Some(t) if t.key == key) {
            self.builds += 1;
            *entry = None;
        }
        entry.get_or_insert_with(|| PoissonTable::build(mean))
    }

    /// Total number of table builds (cache misses) so far.
    pub fn builds(&self) -> usize {
        self.builds
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_mean_skips_cache() {
        let mut cache = PoissonCache::new();
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(cache.sample(&mut rng, 0.0), 0);
        }
        assert_eq!(cache.builds(), 0);
        assert_eq!(cache.occupied(), 0);
    }

    #[test]
    fn test_table_is_reused() {
        let mut cache = PoissonCache::new();
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..1000 {
            cache.sample(&mut rng, 3.5);
        }
        assert_eq!(cache.builds(), 1);
    }

    #[test]
    fn test_table_values_are_sorted_runs() {
        let table = PoissonTable::build(5.0);
        assert!(table.filled() <= BUCKETS);
        assert!(table.filled() > BUCKETS - 16);
        assert!(table.buckets().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_ln_factorial_matches_sum_at_switchover() {
        let exact: f64 = (2..=40).map(|i| (i as f64).ln()).sum();
        assert!((ln_factorial(40) - exact).abs() < 1e-9);
    }

    #[test]
    fn test_large_mean_centres_on_mean() {
        let table = PoissonTable::build(5000.0);
        let avg: f64 =
            table.buckets().iter().map(|&v| v as f64).sum::<f64>() / table.filled() as f64;
        assert!((avg - 5000.0).abs() < 5.0);
    }
}
