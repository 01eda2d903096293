use crate::config::MigrationModel;
use crate::error::{SimError, SimResult};
use rand::Rng;

// A draw can fall past the last cumulative entry when rounding leaves the row
// sum just short of 1. Such draws are retried this many times.
const MAX_REROLLS: usize = 16;

/// Normalized migration destinations.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationTable {
    Uniform {
        rate: f64,
        islands: usize,
    },
    Matrix {
        rate: f64,
        /// Row `i`: probability of moving from `i` to each island, self zeroed.
        rows: Vec<Vec<f64>>,
        cumulative: Vec<Vec<f64>>,
        /// Last destination with nonzero probability, per row.
        fallback: Vec<usize>,
    },
}

impl MigrationTable {
    pub fn from_model(model: &MigrationModel, islands: usize) -> SimResult<Self> {
        let rate = model.rate();
        if !(0.0..=1.0).contains(&rate) {
            return Err(SimError::config(
                "migration",
                format!("rate {} is outside [0, 1]", rate),
            ));
        }

        let raw = match model {
            MigrationModel::Uniform { .. } => return Ok(Self::Uniform { rate, islands }),
            MigrationModel::Matrix { rows, .. } => rows,
        };

        if raw.len() != islands {
            return Err(SimError::config(
                "migration",
                format!("matrix has {} rows for {} islands", raw.len(), islands),
            ));
        }

        let mut rows = Vec::with_capacity(islands);
        let mut cumulative = Vec::with_capacity(islands);
        let mut fallback = Vec::with_capacity(islands);

        for (i, row) in raw.iter().enumerate() {
            if row.len() != islands {
                return Err(SimError::config(
                    "migration",
                    format!("row {} has {} entries, expected {}", i, row.len(), islands),
                ));
            }
            if row.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(SimError::config(
                    "migration",
                    format!("row {} has a negative or non-finite weight", i),
                ));
            }

            let total: f64 = row.iter().enumerate().filter(|&(j, _)| j != i).map(|(_, w)| w).sum();
            if total <= 0.0 {
                return Err(SimError::config(
                    "migration",
                    format!("island {} has no outgoing migration weight", i),
                ));
            }

            let normalized: Vec<f64> = row
                .iter()
                .enumerate()
                .map(|(j, &w)| if j == i { 0.0 } else { w / total })
                .collect();

            let mut acc = 0.0;
            let cdf: Vec<f64> = normalized
                .iter()
                .map(|&p| {
                    acc += p;
                    acc
                })
                .collect();

            let last = normalized
                .iter()
                .rposition(|&p| p > 0.0)
                .unwrap_or(if i == 0 { 1 } else { 0 });

            rows.push(normalized);
            cumulative.push(cdf);
            fallback.push(last);
        }

        Ok(Self::Matrix {
            rate,
            rows,
            cumulative,
            fallback,
        })
    }

    pub fn rate(&self) -> f64 {
        match self {
            Self::Uniform { rate, .. } | Self::Matrix { rate, .. } => *rate,
        }
    }

    pub fn islands(&self) -> usize {
        match self {
            Self::Uniform { islands, .. } => *islands,
            Self::Matrix { rows, .. } => rows.len(),
        }
    }

    /// Probability of a migrant from `from` landing on `to`.
    pub fn probability(&self, from: usize, to: usize) -> f64 {
        match self {
            _ if from == to => 0.0,
            Self::Uniform { islands, .. } => 1.0 / (*islands - 1) as f64,
            Self::Matrix { rows, .. } => rows[from][to],
        }
    }

    /// Picks a destination island other than `from`.
    #[inline]
    pub fn destination<R: Rng + ?Sized>(&self, rng: &mut R, from: usize) -> usize {
        match self {
            Self::Uniform { islands, .. } => {
                let k = rng.gen_range(0..*islands - 1);
                if k >= from {
                    k + 1
                } else {
                    k
                }
            }
            Self::Matrix {
                cumulative,
                fallback,
                ..
            } => {
                let cdf = &cumulative[from];
                for _ in 0..MAX_REROLLS {
                    let u: f64 = rng.gen();
                    if let Some(to) = cdf.iter().position(|&c| u < c) {
                        return to;
                    }
                }
                fallback[from]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_self_weight_is_ignored() {
        let model = MigrationModel::Matrix {
            rate: 0.5,
            rows: vec![vec![9.0, 1.0, 3.0], vec![1.0, 9.0, 1.0], vec![2.0, 2.0, 0.0]],
        };
        let table = MigrationTable::from_model(&model, 3).unwrap();
        assert_eq!(table.probability(0, 0), 0.0);
        assert!((table.probability(0, 1) - 0.25).abs() < 1e-12);
        assert!((table.probability(0, 2) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_never_picks_self() {
        let table = MigrationTable::Uniform {
            rate: 1.0,
            islands: 4,
        };
        let mut rng = SmallRng::seed_from_u64(11);
        for from in 0..4 {
            for _ in 0..500 {
                let to = table.destination(&mut rng, from);
                assert_ne!(to, from);
                assert!(to < 4);
            }
        }
    }

    #[test]
    fn test_rejects_row_without_exits() {
        let model = MigrationModel::Matrix {
            rate: 0.1,
            rows: vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        };
        assert!(MigrationTable::from_model(&model, 2).is_err());
    }
}
