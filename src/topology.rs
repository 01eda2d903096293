//! Builds unnormalized migration matrices from island coordinates.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

// Coincident islands are treated as this far apart.
const MIN_DISTANCE: f64 = 1e-9;

#[derive(
    Debug, Clone, Copy, EnumIter, EnumString, Display, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// Weight every other island by `1 / distance`.
    InverseDistance,
    /// Migrate only to the closest island (ties share equally).
    Nearest,
    /// Migrate to the two closest islands.
    TwoNearest,
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Row `i` holds the relative weight of migrating from island `i` to each
/// island. The diagonal is always zero; validation normalizes the rows.
pub fn build_matrix(coords: &[(f64, f64)], kind: TopologyKind) -> Vec<Vec<f64>> {
    let n = coords.len();
    let mut rows = vec![vec![0.0; n]; n];

    for (i, row) in rows.iter_mut().enumerate() {
        let mut others: Vec<(usize, f64)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| (j, distance(coords[i], coords[j]).max(MIN_DISTANCE)))
            .collect();

        match kind {
            TopologyKind::InverseDistance => {
                for (j, d) in others {
                    row[j] = 1.0 / d;
                }
            }
            TopologyKind::Nearest | TopologyKind::TwoNearest => {
                others.sort_by(|a, b| a.1.total_cmp(&b.1));
                let keep = if kind == TopologyKind::Nearest { 1 } else { 2 };
                let Some(&(_, cutoff)) = others.get(keep.min(others.len()).saturating_sub(1))
                else {
                    continue;
                };
                for (j, d) in others {
                    if d <= cutoff {
                        row[j] = 1.0;
                    }
                }
            }
        }
    }

    rows
}
