//! Weighted least-squares polynomial fit over the per-slice mean outcomes.
//!
//! The workspace is allocated once per simulation (sized by degree and slice
//! count) and reused by whichever worker performs the hot -> warm copy.

use crate::stats::OnlineStats;
use serde::{Deserialize, Serialize};

// Keeps inverse-variance weights finite when a slice has no spread yet.
const VARIANCE_FLOOR: f64 = 1e-6;
const MINIMUM_SCAN_POINTS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Coefficients in increasing power order: `c[0] + c[1] x + ...`.
    pub coefficients: Vec<f64>,
    /// Incumbent strategy in bounds where the polynomial is smallest.
    pub minimum_x: f64,
    pub minimum_y: f64,
}

impl FitResult {
    pub fn eval(&self, x: f64) -> f64 {
        horner(&self.coefficients, x)
    }
}

#[inline]
fn horner(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

#[derive(Debug, Clone)]
pub struct FitWorkspace {
    degree: usize,
    weighted: bool,
    // Row-major slices x (degree + 1).
    design: Vec<f64>,
    weights: Vec<f64>,
    response: Vec<f64>,
    // Normal equations, augmented: (degree + 1) x (degree + 2).
    normal: Vec<f64>,
}

impl FitWorkspace {
    pub fn new(degree: usize, slices: usize, weighted: bool) -> Self {
        let p = degree + 1;
        Self {
            degree,
            weighted,
            design: vec![0.0; slices * p],
            weights: vec![0.0; slices],
            response: vec![0.0; slices],
            normal: vec![0.0; p * (p + 1)],
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn slices(&self) -> usize {
        self.weights.len()
    }

    /// Reloads the design matrix, weights and response vector.
    ///
    /// Slices with no samples get weight zero.
    pub fn refresh(&mut self, strategies: &[f64], stats: &[OnlineStats]) {
        let p = self.degree + 1;
        for (i, (&x, s)) in strategies.iter().zip(stats).enumerate() {
            let mut power = 1.0;
            for j in 0..p {
                self.design[i * p + j] = power;
                power *= x;
            }
            self.response[i] = s.mean();
            self.weights[i] = match (s.count(), self.weighted) {
                (0, _) => 0.0,
                (n, true) => n as f64 / s.variance().max(VARIANCE_FLOOR),
                (_, false) => 1.0,
            };
        }
    }

    /// Solves the weighted normal equations. Returns `None` when fewer slices
    /// carry weight than there are coefficients, or the system is singular.
    pub fn solve(&mut self) -> Option<Vec<f64>> {
        let p = self.degree + 1;
        let w = p + 1;
        let populated = self.weights.iter().filter(|&&wt| wt > 0.0).count();
        if populated < p {
            return None;
        }

        self.normal.iter_mut().for_each(|v| *v = 0.0);
        for i in 0..self.weights.len() {
            let wt = self.weights[i];
            if wt == 0.0 {
                continue;
            }
            let row = &self.design[i * p..(i + 1) * p];
            for a in 0..p {
                for b in 0..p {
                    self.normal[a * w + b] += wt * row[a] * row[b];
                }
                self.normal[a * w + p] += wt * row[a] * self.response[i];
            }
        }

        // Gaussian elimination with partial pivoting.
        for col in 0..p {
            let pivot = (col..p).max_by(|&a, &b| {
                self.normal[a * w + col]
                    .abs()
                    .total_cmp(&self.normal[b * w + col].abs())
            })?;
            if self.normal[pivot * w + col].abs() < 1e-300 {
                return None;
            }
            if pivot != col {
                for k in 0..w {
                    self.normal.swap(col * w + k, pivot * w + k);
                }
            }
            for r in (col + 1)..p {
                let factor = self.normal[r * w + col] / self.normal[col * w + col];
                for k in col..w {
                    self.normal[r * w + k] -= factor * self.normal[col * w + k];
                }
            }
        }

        let mut coefficients = vec![0.0; p];
        for r in (0..p).rev() {
            let mut acc = self.normal[r * w + p];
            for k in (r + 1)..p {
                acc -= self.normal[r * w + k] * coefficients[k];
            }
            coefficients[r] = acc / self.normal[r * w + r];
        }

        if coefficients.iter().all(|c| c.is_finite()) {
            Some(coefficients)
        } else {
            None
        }
    }

    /// Refreshes, solves and locates the minimum over `[lower, upper]`.
    pub fn fit(
        &mut self,
        strategies: &[f64],
        stats: &[OnlineStats],
        lower: f64,
        upper: f64,
    ) -> Option<FitResult> {
        self.refresh(strategies, stats);
        let coefficients = self.solve()?;

        let (minimum_x, minimum_y) = (0..=MINIMUM_SCAN_POINTS)
            .map(|i| {
                let x = lower + (upper - lower) * i as f64 / MINIMUM_SCAN_POINTS as f64;
                (x, horner(&coefficients, x))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))?;

        Some(FitResult {
            coefficients,
            minimum_x,
            minimum_y,
        })
    }
}
