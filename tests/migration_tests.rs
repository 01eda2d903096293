use archipelago::config::MigrationModel;
use archipelago::engine::MigrationTable;
use archipelago::topology::{build_matrix, TopologyKind};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rstest::rstest;
use strum::IntoEnumIterator;

fn matrix_table(rows: Vec<Vec<f64>>) -> MigrationTable {
    let n = rows.len();
    MigrationTable::from_model(&MigrationModel::Matrix { rate: 0.2, rows }, n).unwrap()
}

#[test]
fn test_rows_sum_to_one_excluding_self() {
    let table = matrix_table(vec![
        vec![5.0, 1.0, 2.0, 3.0],
        vec![0.1, 0.0, 0.1, 0.3],
        vec![1e-6, 3e-6, 7.0, 2e-6],
        vec![1.0, 1.0, 1.0, 1.0],
    ]);
    for from in 0..4 {
        let sum: f64 = (0..4)
            .filter(|&to| to != from)
            .map(|to| table.probability(from, to))
            .sum();
        assert!((sum - 1.0).abs() < 1e-9, "row {} sums to {}", from, sum);
        assert_eq!(table.probability(from, from), 0.0);
    }
}

#[test]
fn test_sampling_matches_row() {
    let table = matrix_table(vec![
        vec![0.0, 1.0, 2.0, 7.0],
        vec![1.0, 0.0, 1.0, 1.0],
        vec![1.0, 1.0, 0.0, 1.0],
        vec![1.0, 1.0, 1.0, 0.0],
    ]);
    let mut rng = SmallRng::seed_from_u64(2024);
    let draws = 10_000;
    let mut hits = [0usize; 4];
    for _ in 0..draws {
        hits[table.destination(&mut rng, 0)] += 1;
    }

    assert_eq!(hits[0], 0);
    for to in 1..4 {
        let observed = hits[to] as f64 / draws as f64;
        let expected = table.probability(0, to);
        // ~4.5 standard errors at p = 0.5.
        assert!(
            (observed - expected).abs() < 0.025,
            "destination {}: observed {:.3}, expected {:.3}",
            to,
            observed,
            expected
        );
    }
}

#[test]
fn test_uniform_spreads_evenly() {
    let table = MigrationTable::from_model(&MigrationModel::Uniform { rate: 1.0 }, 5).unwrap();
    let mut rng = SmallRng::seed_from_u64(5);
    let draws = 10_000;
    let mut hits = [0usize; 5];
    for _ in 0..draws {
        hits[table.destination(&mut rng, 2)] += 1;
    }
    assert_eq!(hits[2], 0);
    for (to, &h) in hits.iter().enumerate().filter(|&(to, _)| to != 2) {
        let observed = h as f64 / draws as f64;
        assert!((observed - 0.25).abs() < 0.02, "destination {}: {}", to, observed);
    }
}

#[rstest]
#[case(-0.1)]
#[case(1.5)]
#[case(f64::NAN)]
fn test_rate_out_of_range(#[case] rate: f64) {
    assert!(MigrationTable::from_model(&MigrationModel::Uniform { rate }, 3).is_err());
}

#[rstest]
#[case(vec![vec![0.0, 1.0]])]
#[case(vec![vec![0.0, 1.0], vec![1.0]])]
#[case(vec![vec![0.0, -1.0], vec![1.0, 0.0]])]
fn test_bad_matrix_shapes(#[case] rows: Vec<Vec<f64>>) {
    let model = MigrationModel::Matrix { rate: 0.1, rows };
    assert!(MigrationTable::from_model(&model, 2).is_err());
}

#[test]
fn test_every_topology_normalizes() {
    let coords = [(0.0, 0.0), (1.0, 0.0), (0.0, 2.0), (5.0, 5.0), (5.0, 5.0)];
    for kind in TopologyKind::iter() {
        let table = matrix_table(build_matrix(&coords, kind));
        for from in 0..coords.len() {
            let sum: f64 = (0..coords.len()).map(|to| table.probability(from, to)).sum();
            assert!((sum - 1.0).abs() < 1e-9, "{} row {} sums to {}", kind, from, sum);
        }
    }
}

#[test]
fn test_two_nearest_picks_two_destinations() {
    let coords = [(0.0, 0.0), (1.0, 0.0), (2.5, 0.0), (10.0, 0.0)];
    let table = matrix_table(build_matrix(&coords, TopologyKind::TwoNearest));
    assert!((table.probability(0, 1) - 0.5).abs() < 1e-12);
    assert!((table.probability(0, 2) - 0.5).abs() < 1e-12);
    assert_eq!(table.probability(0, 3), 0.0);
}
