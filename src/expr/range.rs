use super::program::{EvalFault, Program};
use rayon::prelude::*;
use serde::Serialize;

/// Extremes of the payoff over a strategy grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PayoffRange {
    pub min: f64,
    pub max: f64,
    /// `(x, X, n)` at which the minimum was found.
    pub argmin: (f64, f64, f64),
    pub argmax: (f64, f64, f64),
}

impl PayoffRange {
    fn point(x: f64, aggregate: f64, n: f64, value: f64) -> Self {
        Self {
            min: value,
            max: value,
            argmin: (x, aggregate, n),
            argmax: (x, aggregate, n),
        }
    }

    fn merge(self, other: Self) -> Self {
        let (min, argmin) = if other.min < self.min {
            (other.min, other.argmin)
        } else {
            (self.min, self.argmin)
        };
        let (max, argmax) = if other.max > self.max {
            (other.max, other.argmax)
        } else {
            (self.max, self.argmax)
        };
        Self {
            min,
            max,
            argmin,
            argmax,
        }
    }
}

/// Scans the payoff over every `(x, X)` pair of an evenly spaced grid on
/// `[lower, upper]` for each population size in `populations`.
///
/// Every rayon task evaluates its own copy of the program. The first fault
/// encountered (in grid order) is returned.
pub fn scan(
    program: &Program,
    lower: f64,
    upper: f64,
    steps: usize,
    populations: &[usize],
) -> Result<PayoffRange, EvalFault> {
    let steps = steps.max(2);
    let grid: Vec<f64> = (0..steps)
        .map(|i| lower + (upper - lower) * i as f64 / (steps - 1) as f64)
        .collect();

    let rows: Vec<(f64, f64)> = populations
        .iter()
        .flat_map(|&n| grid.iter().map(move |&x| (n as f64, x)))
        .collect();

    let partials: Vec<Result<PayoffRange, EvalFault>> = rows
        .par_iter()
        .map_init(
            || program.clone(),
            |local, &(n, x)| {
                let mut acc: Option<PayoffRange> = None;
                for &aggregate in &grid {
                    let value = local.eval(x, aggregate, n)?;
                    let here = PayoffRange::point(x, aggregate, n, value);
                    acc = Some(match acc {
                        Some(prev) => prev.merge(here),
                        None => here,
                    });
                }
                Ok(acc.unwrap_or(PayoffRange::point(x, x, n, 0.0)))
            },
        )
        .collect();

    let mut total: Option<PayoffRange> = None;
    for partial in partials {
        let range = partial?;
        total = Some(match total {
            Some(prev) => prev.merge(range),
            None => range,
        });
    }
    Ok(total.unwrap_or(PayoffRange::point(lower, lower, 0.0, 0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;

    #[test]
    fn test_scan_linear_payoff() {
        let prog = parse("x - X").unwrap();
        let range = scan(&prog, 0.0, 1.0, 11, &[10]).unwrap();
        assert!((range.min + 1.0).abs() < 1e-12);
        assert!((range.max - 1.0).abs() < 1e-12);
        assert_eq!(range.argmax, (1.0, 0.0, 10.0));
    }

    #[test]
    fn test_scan_reports_fault() {
        let prog = parse("1 / (x - 0.5)").unwrap();
        assert!(scan(&prog, 0.0, 1.0, 3, &[4]).is_err());
    }
}
