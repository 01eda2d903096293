use serde::{Deserialize, Serialize};

/// Which side of a trial went extinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extinction {
    /// Outcome `0.0`: the mutant line died out.
    Mutant,
    /// Outcome `1.0`: the mutant replaced every incumbent.
    Incumbent,
}

/// Incremental mean/variance accumulator (Welford) over trial outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OnlineStats {
    count: u64,
    mean: f64,
    m2: f64,
    mutant_extinct: u64,
    incumbent_extinct: u64,
}

impl OnlineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let n = self.count as f64;
        let delta = x - self.mean;
        self.mean += delta / n;
        self.m2 += delta * delta * (n - 1.0) / n;

        if x == 0.0 {
            self.mutant_extinct += 1;
        } else if x == 1.0 {
            self.incumbent_extinct += 1;
        }
    }

    /// Folds another accumulator into this one (Chan et al. pairwise update).
    pub fn merge(&mut self, other: &OnlineStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let na = self.count as f64;
        let nb = other.count as f64;
        let n = na + nb;
        let delta = other.mean - self.mean;

        self.mean += delta * nb / n;
        self.m2 += other.m2 + delta * delta * na * nb / n;
        self.count += other.count;
        self.mutant_extinct += other.mutant_extinct;
        self.incumbent_extinct += other.incumbent_extinct;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance; 0 with fewer than two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / (self.count - 1) as f64).max(0.0)
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Fraction of samples that ended in the given extinction.
    pub fn extinction_rate(&self, kind: Extinction) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let hits = match kind {
            Extinction::Mutant => self.mutant_extinct,
            Extinction::Incumbent => self.incumbent_extinct,
        };
        hits as f64 / self.count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_matches_sequential() {
        let xs = [0.1, 0.4, 0.0, 1.0, 0.7, 0.25, 0.9];
        let mut seq = OnlineStats::new();
        xs.iter().for_each(|&x| seq.push(x));

        let mut a = OnlineStats::new();
        let mut b = OnlineStats::new();
        xs[..3].iter().for_each(|&x| a.push(x));
        xs[3..].iter().for_each(|&x| b.push(x));
        a.merge(&b);

        assert_eq!(a.count(), seq.count());
        assert!((a.mean() - seq.mean()).abs() < 1e-12);
        assert!((a.variance() - seq.variance()).abs() < 1e-12);
        assert_eq!(
            a.extinction_rate(Extinction::Mutant),
            seq.extinction_rate(Extinction::Mutant)
        );
    }

    #[test]
    fn test_merge_into_empty() {
        let mut a = OnlineStats::new();
        let mut b = OnlineStats::new();
        b.push(0.5);
        b.push(1.0);
        a.merge(&b);
        assert_eq!(a, b);
    }
}
