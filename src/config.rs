use crate::engine::migration::MigrationTable;
use crate::engine::trial::MAX_BIRTH_MEAN;
use crate::error::{SimError, SimResult};
use crate::expr::{self, PayoffRange, Program};
use crate::fit::FitWorkspace;
use crate::loader;
use crate::snapshot::GridSpec;
use crate::topology::{self, TopologyKind};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationModel {
    /// Mutants take every grid value in turn.
    Grid,
    /// Mutants are drawn from `Normal(incumbent, sigma)` truncated to the bounds.
    Gaussian { sigma: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IslandLayout {
    Uniform { count: usize, population: usize },
    Explicit { populations: Vec<usize> },
}

impl IslandLayout {
    pub fn count(&self) -> usize {
        match self {
            IslandLayout::Uniform { count, .. } => *count,
            IslandLayout::Explicit { populations } => populations.len(),
        }
    }

    pub fn populations(&self) -> Vec<usize> {
        match self {
            IslandLayout::Uniform { count, population } => vec![*population; *count],
            IslandLayout::Explicit { populations } => populations.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationModel {
    /// Migrants pick any other island uniformly.
    Uniform { rate: f64 },
    /// Migrants from island `i` pick `j` with probability `rows[i][j]`
    /// (self excluded, rows normalized on validation).
    Matrix { rate: f64, rows: Vec<Vec<f64>> },
}

impl MigrationModel {
    pub fn rate(&self) -> f64 {
        match self {
            MigrationModel::Uniform { rate } | MigrationModel::Matrix { rate, .. } => *rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitConfig {
    pub degree: usize,
    /// Weight each slice by the inverse variance of its mean.
    pub weighted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub payoff: String,
    pub lower: f64,
    pub upper: f64,
    pub mutation: MutationModel,
    pub slices: usize,
    pub islands: IslandLayout,
    pub migration: MigrationModel,
    pub alpha: f64,
    pub delta: f64,
    /// Generation cap per trial.
    pub generations: u64,
    /// Mean number of generations between island deaths.
    pub island_death: Option<f64>,
    pub fit: Option<FitConfig>,
    pub threads: usize,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            payoff: "x / X - x".to_string(),
            lower: 0.1,
            upper: 1.0,
            mutation: MutationModel::Grid,
            slices: 10,
            islands: IslandLayout::Uniform {
                count: 4,
                population: 10,
            },
            migration: MigrationModel::Uniform { rate: 0.1 },
            alpha: 1.0,
            delta: 0.1,
            generations: 1000,
            island_death: None,
            fit: None,
            threads: default_threads(),
            seed: None,
        }
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl SimulationConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Checks every field and freezes the configuration for a run.
    pub fn validate(self) -> SimResult<ValidatedConfig> {
        let program = expr::parse(&self.payoff)?;

        if !self.lower.is_finite() || !self.upper.is_finite() {
            return Err(SimError::config("bounds", "strategy bounds must be finite"));
        }
        if self.lower >= self.upper {
            return Err(SimError::config(
                "bounds",
                format!(
                    "lower bound {} must be below upper bound {}",
                    self.lower, self.upper
                ),
            ));
        }
        if self.slices < 2 {
            return Err(SimError::config("slices", "at least 2 slices are required"));
        }

        let populations = self.islands.populations();
        if populations.len() < 2 {
            return Err(SimError::config("islands", "at least 2 islands are required"));
        }
        if let Some((idx, pop)) = populations.iter().enumerate().find(|(_, &p)| p < 2) {
            return Err(SimError::config(
                "islands",
                format!("island {} has population {} (minimum is 2)", idx, pop),
            ));
        }
        if populations.iter().any(|&p| p > u32::MAX as usize) {
            return Err(SimError::config("islands", "island population too large"));
        }

        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(SimError::config("alpha", "alpha must be finite and non-negative"));
        }
        if self.alpha > MAX_BIRTH_MEAN {
            return Err(SimError::config(
                "alpha",
                format!(
                    "alpha {} is above the maximum birth mean {}",
                    self.alpha, MAX_BIRTH_MEAN
                ),
            ));
        }
        if !self.delta.is_finite() {
            return Err(SimError::config("delta", "delta must be finite"));
        }
        if self.generations == 0 {
            return Err(SimError::config("generations", "generation cap must be positive"));
        }
        if let MutationModel::Gaussian { sigma } = self.mutation {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(SimError::config("mutation", "sigma must be positive"));
            }
        }
        if let Some(mean) = self.island_death {
            if !mean.is_finite() || mean <= 0.0 {
                return Err(SimError::config(
                    "island_death",
                    "mean death interval must be positive",
                ));
            }
        }
        if let Some(fit) = self.fit {
            if fit.degree + 1 > self.slices {
                return Err(SimError::config(
                    "fit",
                    format!(
                        "degree {} needs at least {} slices",
                        fit.degree,
                        fit.degree + 1
                    ),
                ));
            }
        }
        if self.threads == 0 {
            return Err(SimError::config("threads", "at least one worker is required"));
        }

        let migration = MigrationTable::from_model(&self.migration, populations.len())?;

        let strategies: Vec<f64> = (0..self.slices)
            .map(|i| self.lower + (self.upper - self.lower) * i as f64 / (self.slices - 1) as f64)
            .collect();
        let mutant_slices = match self.mutation {
            MutationModel::Grid => self.slices,
            MutationModel::Gaussian { .. } => 1,
        };
        let grid = GridSpec {
            strategies,
            mutant_slices,
            islands: populations.len(),
            lower: self.lower,
            upper: self.upper,
        };

        let payoff_range = probe_payoff(&program, &self, &populations);
        if let Some(range) = payoff_range {
            let best = if self.delta >= 0.0 { range.max } else { range.min };
            let highest_birth = self.alpha * (1.0 + self.delta * best);
            if highest_birth > MAX_BIRTH_MEAN {
                return Err(SimError::config(
                    "payoff",
                    format!(
                        "birth mean reaches {:.3e} on the grid (maximum is {})",
                        highest_birth, MAX_BIRTH_MEAN
                    ),
                ));
            }
        }

        Ok(ValidatedConfig {
            source: self,
            program,
            populations,
            migration,
            grid,
            payoff_range,
        })
    }
}

/// Scans the payoff over the grid so obviously broken formulas are reported
/// before any trial runs. Faults found here are only warnings: the engine
/// reports them authoritatively when a trial hits them.
fn probe_payoff(
    program: &Program,
    cfg: &SimulationConfig,
    populations: &[usize],
) -> Option<PayoffRange> {
    let mut distinct = populations.to_vec();
    distinct.sort_unstable();
    distinct.dedup();

    match expr::scan(program, cfg.lower, cfg.upper, cfg.slices, &distinct) {
        Ok(range) => {
            let worst = if cfg.delta >= 0.0 { range.min } else { range.max };
            let lowest_birth = cfg.alpha * (1.0 + cfg.delta * worst);
            if lowest_birth < 0.0 {
                warn!(
                    "Birth rate goes negative ({:.3}) on the grid; such individuals will not reproduce.",
                    lowest_birth
                );
            }
            debug!("Payoff range on grid: [{:.4}, {:.4}]", range.min, range.max);
            Some(range)
        }
        Err(fault) => {
            warn!("Payoff probe hit an arithmetic fault: {}", fault);
            None
        }
    }
}

/// Configuration frozen for the lifetime of one simulation.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub source: SimulationConfig,
    pub program: Program,
    pub populations: Vec<usize>,
    pub migration: MigrationTable,
    pub grid: GridSpec,
    pub payoff_range: Option<PayoffRange>,
}

impl ValidatedConfig {
    pub fn islands(&self) -> usize {
        self.populations.len()
    }

    pub fn total_population(&self) -> usize {
        self.populations.iter().sum()
    }

    pub fn strategy(&self, slice: usize) -> f64 {
        self.grid.strategies[slice]
    }

    pub fn fit_workspace(&self) -> Option<FitWorkspace> {
        self.source
            .fit
            .map(|f| FitWorkspace::new(f.degree, self.grid.slices(), f.weighted))
    }
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Clone)]
pub struct ModelParams {
    /// Payoff formula over x (focal), X (aggregate opponents) and n (island size)
    #[arg(long, default_value = "x / X - x")]
    pub payoff: String,
    #[arg(long, default_value_t = 0.1)]
    pub lower: f64,
    #[arg(long, default_value_t = 1.0)]
    pub upper: f64,
    #[arg(long, default_value_t = 10)]
    pub slices: usize,
    /// Draw mutants from a Gaussian around the incumbent instead of the grid
    #[arg(long)]
    pub sigma: Option<f64>,
    #[arg(long, default_value_t = 1.0)]
    pub alpha: f64,
    #[arg(long, default_value_t = 0.1)]
    pub delta: f64,
    #[arg(long, default_value_t = 1000)]
    pub generations: u64,
    /// Mean generations between island deaths
    #[arg(long)]
    pub island_death: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct IslandParams {
    #[arg(long, default_value_t = 4)]
    pub islands: usize,
    #[arg(long, default_value_t = 10)]
    pub population: usize,
    /// Explicit per-island populations, e.g. "10,20,15"
    #[arg(long, value_delimiter = ',')]
    pub populations: Vec<usize>,
    /// Probability that an offspring migrates
    #[arg(long, default_value_t = 0.1)]
    pub migration: f64,
    /// CSV migration matrix, one row per island
    #[arg(long)]
    pub matrix: Option<PathBuf>,
    /// CSV island coordinates (x,y) to derive the migration matrix from
    #[arg(long)]
    pub coords: Option<PathBuf>,
    #[arg(long, default_value_t = TopologyKind::InverseDistance)]
    pub topology: TopologyKind,
}

#[derive(Args, Debug, Clone)]
pub struct RunnerParams {
    #[arg(long)]
    pub threads: Option<usize>,
    #[arg(short = 'S', long)]
    pub seed: Option<u64>,
    /// Fit a polynomial of this degree to the mean outcomes
    #[arg(long)]
    pub fit_degree: Option<usize>,
    #[arg(long, default_value_t = false)]
    pub fit_weighted: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SimParams {
    /// JSON configuration; command line model flags are ignored when given
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[command(flatten)]
    pub model: ModelParams,
    #[command(flatten)]
    pub islands: IslandParams,
    #[command(flatten)]
    pub runner: RunnerParams,
}

impl SimParams {
    pub fn to_config(&self) -> SimResult<SimulationConfig> {
        let mut cfg = match &self.config {
            Some(path) => SimulationConfig::load_from_file(path)?,
            None => self.from_flags()?,
        };
        // Runner flags always apply.
        if let Some(t) = self.runner.threads {
            cfg.threads = t;
        }
        if self.runner.seed.is_some() {
            cfg.seed = self.runner.seed;
        }
        Ok(cfg)
    }

    fn from_flags(&self) -> SimResult<SimulationConfig> {
        let m = &self.model;
        let isl = &self.islands;

        let islands = if isl.populations.is_empty() {
            IslandLayout::Uniform {
                count: isl.islands,
                population: isl.population,
            }
        } else {
            IslandLayout::Explicit {
                populations: isl.populations.clone(),
            }
        };

        let migration = match (&isl.matrix, &isl.coords) {
            (Some(path), _) => MigrationModel::Matrix {
                rate: isl.migration,
                rows: loader::load_matrix(path)?,
            },
            (None, Some(path)) => {
                let coords = loader::load_coordinates(path)?;
                MigrationModel::Matrix {
                    rate: isl.migration,
                    rows: topology::build_matrix(&coords, isl.topology),
                }
            }
            (None, None) => MigrationModel::Uniform {
                rate: isl.migration,
            },
        };

        Ok(SimulationConfig {
            payoff: m.payoff.clone(),
            lower: m.lower,
            upper: m.upper,
            mutation: match m.sigma {
                Some(sigma) => MutationModel::Gaussian { sigma },
                None => MutationModel::Grid,
            },
            slices: m.slices,
            islands,
            migration,
            alpha: m.alpha,
            delta: m.delta,
            generations: m.generations,
            island_death: m.island_death,
            fit: self.runner.fit_degree.map(|degree| FitConfig {
                degree,
                weighted: self.runner.fit_weighted,
            }),
            threads: self.runner.threads.unwrap_or_else(default_threads),
            seed: self.runner.seed,
        })
    }
}
