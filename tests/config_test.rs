use archipelago::config::{
    FitConfig, IslandLayout, MigrationModel, MutationModel, SimulationConfig,
};
use archipelago::SimError;
use rstest::rstest;
use std::io::Write;
use tempfile::NamedTempFile;

fn base() -> SimulationConfig {
    SimulationConfig {
        threads: 1,
        ..Default::default()
    }
}

fn field_of(err: SimError) -> &'static str {
    match err {
        SimError::Config { field, .. } => field,
        SimError::Parse(_) => "payoff",
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_default_config_validates() {
    let v = base().validate().unwrap();
    assert_eq!(v.islands(), 4);
    assert_eq!(v.total_population(), 40);
    assert_eq!(v.grid.slices(), 10);
    assert_eq!(v.grid.mutant_slices, 10);
    assert!(v.payoff_range.is_some());
}

#[test]
fn test_grid_includes_both_bounds() {
    let v = SimulationConfig {
        lower: 0.0,
        upper: 2.0,
        slices: 5,
        ..base()
    }
    .validate()
    .unwrap();
    assert_eq!(v.grid.strategies, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
}

#[test]
fn test_gaussian_uses_one_mutant_column() {
    let v = SimulationConfig {
        mutation: MutationModel::Gaussian { sigma: 0.05 },
        ..base()
    }
    .validate()
    .unwrap();
    assert_eq!(v.grid.mutant_slices, 1);
}

#[rstest]
#[case::one_island(SimulationConfig { islands: IslandLayout::Uniform { count: 1, population: 10 }, ..base() }, "islands")]
#[case::tiny_island(SimulationConfig { islands: IslandLayout::Explicit { populations: vec![10, 1, 10] }, ..base() }, "islands")]
#[case::reversed_bounds(SimulationConfig { lower: 1.0, upper: 0.5, ..base() }, "bounds")]
#[case::equal_bounds(SimulationConfig { lower: 1.0, upper: 1.0, ..base() }, "bounds")]
#[case::one_slice(SimulationConfig { slices: 1, ..base() }, "slices")]
#[case::bad_payoff(SimulationConfig { payoff: "x +* X".into(), ..base() }, "payoff")]
#[case::no_threads(SimulationConfig { threads: 0, ..base() }, "threads")]
#[case::bad_rate(SimulationConfig { migration: MigrationModel::Uniform { rate: 2.0 }, ..base() }, "migration")]
#[case::bad_sigma(SimulationConfig { mutation: MutationModel::Gaussian { sigma: 0.0 }, ..base() }, "mutation")]
#[case::fit_too_high(SimulationConfig { fit: Some(FitConfig { degree: 10, weighted: false }), ..base() }, "fit")]
#[case::no_generations(SimulationConfig { generations: 0, ..base() }, "generations")]
#[case::bad_death(SimulationConfig { island_death: Some(-3.0), ..base() }, "island_death")]
#[case::huge_alpha(SimulationConfig { alpha: 1e6, ..base() }, "alpha")]
#[case::huge_birth_mean(SimulationConfig { payoff: "exp(10 * x)".into(), lower: 0.0, upper: 2.0, delta: 1.0, ..base() }, "payoff")]
#[case::matrix_shape(SimulationConfig { migration: MigrationModel::Matrix { rate: 0.1, rows: vec![vec![0.0, 1.0]; 3] }, ..base() }, "migration")]
fn test_invalid_configs_name_their_field(
    #[case] config: SimulationConfig,
    #[case] expected: &str,
) {
    let err = config.validate().unwrap_err();
    assert_eq!(field_of(err), expected);
}

#[test]
fn test_matrix_rows_are_normalized() {
    let v = SimulationConfig {
        islands: IslandLayout::Uniform {
            count: 3,
            population: 5,
        },
        migration: MigrationModel::Matrix {
            rate: 0.3,
            rows: vec![
                vec![4.0, 1.0, 3.0],
                vec![2.0, 0.0, 2.0],
                vec![0.0, 5.0, 0.0],
            ],
        },
        ..base()
    }
    .validate()
    .unwrap();

    assert!((v.migration.probability(0, 1) - 0.25).abs() < 1e-12);
    assert!((v.migration.probability(0, 2) - 0.75).abs() < 1e-12);
    assert!((v.migration.probability(2, 1) - 1.0).abs() < 1e-12);
    assert_eq!(v.migration.rate(), 0.3);
}

#[test]
fn test_json_roundtrip_through_file() {
    let config = SimulationConfig {
        payoff: "x * (1 - X) - x^2 / 2".to_string(),
        lower: 0.0,
        islands: IslandLayout::Explicit {
            populations: vec![4, 6, 8],
        },
        island_death: Some(50.0),
        fit: Some(FitConfig {
            degree: 3,
            weighted: true,
        }),
        seed: Some(17),
        ..base()
    };

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let loaded = SimulationConfig::load_from_file(file.path()).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_json_uses_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "payoff": "x - X", "islands": {{ "kind": "uniform", "count": 3, "population": 6 }} }}"#
    )
    .unwrap();

    let loaded = SimulationConfig::load_from_file(file.path()).unwrap();
    assert_eq!(loaded.payoff, "x - X");
    assert_eq!(loaded.islands.populations(), vec![6, 6, 6]);
    assert_eq!(loaded.slices, SimulationConfig::default().slices);
}
