//! A single invasion trial: one mutant seeded on one island of incumbents,
//! run until either type is gone or the generation cap is reached.

use crate::config::{MutationModel, ValidatedConfig};
use crate::expr::EvalFault;
use crate::poisson::PoissonCache;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Truncated normal draws give up and clamp after this many rejections.
const MAX_MUTANT_DRAWS: usize = 1000;

/// Largest per-individual birth mean a trial accepts. Every offspring is
/// dispersed one by one, so this bounds the work done in a generation.
pub const MAX_BIRTH_MEAN: f64 = 1.0e4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialOutcome {
    /// Final mutant fraction of the whole archipelago.
    pub fraction: f64,
    pub generations: u64,
    pub mutants: usize,
    pub population: usize,
    /// False when the trial was abandoned before reaching an end state.
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct BirthMeans {
    mutant: Option<f64>,
    incumbent: Option<f64>,
}

/// Birth means keyed by (island population, mutant count). Rows are
/// allocated lazily per population size and kept across trials.
#[derive(Debug, Default)]
struct PayoffCache {
    rows: Vec<Option<Vec<BirthMeans>>>,
    touched: Vec<usize>,
}

impl PayoffCache {
    fn reset(&mut self) {
        for n in self.touched.drain(..) {
            if let Some(Some(row)) = self.rows.get_mut(n) {
                row.iter_mut().for_each(|e| *e = BirthMeans::default());
            }
        }
    }

    fn entry(&mut self, n: usize, m: usize) -> &mut BirthMeans {
        if self.rows.len() <= n {
            self.rows.resize_with(n + 1, || None);
        }
        let row = self.rows[n].get_or_insert_with(|| vec![BirthMeans::default(); n + 1]);
        if !self.touched.contains(&n) {
            self.touched.push(n);
        }
        &mut row[m]
    }
}

/// Per-worker trial state. Nothing in here is shared between threads.
pub struct TrialRunner {
    config: Arc<ValidatedConfig>,
    rng: SmallRng,
    poisson: PoissonCache,
    payoff: PayoffCache,
    mutants: Vec<usize>,
    incumbents: Vec<usize>,
    arriving_mutants: Vec<usize>,
    arriving_incumbents: Vec<usize>,
}

impl TrialRunner {
    pub fn new(config: Arc<ValidatedConfig>, seed: Option<u64>) -> Self {
        let islands = config.islands();
        let rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_entropy(),
        };
        Self {
            config,
            rng,
            poisson: PoissonCache::new(),
            payoff: PayoffCache::default(),
            mutants: vec![0; islands],
            incumbents: vec![0; islands],
            arriving_mutants: vec![0; islands],
            arriving_incumbents: vec![0; islands],
        }
    }

    pub fn poisson(&self) -> &PoissonCache {
        &self.poisson
    }

    /// Mutant strategy for an incumbent under the configured mutation model.
    /// `grid_value` is the grid column's strategy, used in grid mode.
    pub fn mutant_strategy(&mut self, incumbent: f64, grid_value: f64) -> f64 {
        let (lower, upper) = (self.config.grid.lower, self.config.grid.upper);
        let sigma = match self.config.source.mutation {
            MutationModel::Grid => return grid_value,
            MutationModel::Gaussian { sigma } => sigma,
        };
        let Ok(normal) = Normal::new(incumbent, sigma) else {
            return incumbent;
        };
        for _ in 0..MAX_MUTANT_DRAWS {
            let x = normal.sample(&mut self.rng);
            if (lower..=upper).contains(&x) {
                return x;
            }
        }
        normal.sample(&mut self.rng).clamp(lower, upper)
    }

    /// Runs a trial to completion.
    pub fn run(
        &mut self,
        mutant_x: f64,
        incumbent_x: f64,
        island: usize,
    ) -> Result<TrialOutcome, EvalFault> {
        let never = AtomicBool::new(false);
        self.run_until(mutant_x, incumbent_x, island, &never)
    }

    /// Runs a trial, abandoning it between generations once `stop` is set.
    /// An abandoned trial comes back with `complete == false`.
    pub fn run_until(
        &mut self,
        mutant_x: f64,
        incumbent_x: f64,
        island: usize,
        stop: &AtomicBool,
    ) -> Result<TrialOutcome, EvalFault> {
        let config = Arc::clone(&self.config);
        let islands = config.islands();
        let cap = config.source.generations;
        let rate = config.migration.rate();

        self.payoff.reset();
        for (j, &pop) in config.populations.iter().enumerate() {
            self.mutants[j] = 0;
            self.incumbents[j] = pop;
        }
        self.mutants[island] = 1;
        self.incumbents[island] -= 1;

        let mut next_death = self.next_death_after(0);
        let mut generation = 0;
        let mut complete = true;

        while generation < cap {
            if stop.load(Ordering::Relaxed) {
                complete = false;
                break;
            }

            if let Some(at) = next_death {
                if generation >= at {
                    let victim = self.rng.gen_range(0..islands);
                    self.mutants[victim] = 0;
                    self.incumbents[victim] = 0;
                    next_death = self.next_death_after(generation);
                }
            }

            self.arriving_mutants.iter_mut().for_each(|a| *a = 0);
            self.arriving_incumbents.iter_mut().for_each(|a| *a = 0);

            for j in 0..islands {
                let (m, i) = (self.mutants[j], self.incumbents[j]);
                let n = m + i;
                if n == 0 {
                    continue;
                }
                let means = self.birth_means(n, m, mutant_x, incumbent_x)?;

                let mut born_m = 0;
                for _ in 0..m {
                    born_m += self.poisson.sample(&mut self.rng, means.mutant.unwrap_or(0.0));
                }
                let mut born_i = 0;
                for _ in 0..i {
                    born_i += self.poisson.sample(&mut self.rng, means.incumbent.unwrap_or(0.0));
                }

                self.disperse(j, born_m, true, rate);
                self.disperse(j, born_i, false, rate);
            }

            for j in 0..islands {
                self.settle(j);
            }
            generation += 1;

            let total_m: usize = self.mutants.iter().sum();
            let total_i: usize = self.incumbents.iter().sum();
            if total_m == 0 || total_i == 0 {
                break;
            }
        }

        let mutants: usize = self.mutants.iter().sum();
        let population = mutants + self.incumbents.iter().sum::<usize>();
        let fraction = if population == 0 {
            0.0
        } else {
            mutants as f64 / population as f64
        };

        Ok(TrialOutcome {
            fraction,
            generations: generation,
            mutants,
            population,
            complete,
        })
    }

    fn next_death_after(&mut self, generation: u64) -> Option<u64> {
        let mean = self.config.source.island_death?;
        let gap = self.poisson.sample(&mut self.rng, mean).max(1) as u64;
        Some(generation + gap)
    }

    /// Birth means on an island of `n` with `m` mutants. Only the types
    /// present on the island are evaluated.
    fn birth_means(
        &mut self,
        n: usize,
        m: usize,
        mutant_x: f64,
        incumbent_x: f64,
    ) -> Result<BirthMeans, EvalFault> {
        let config = &self.config;
        let entry = self.payoff.entry(n, m);

        if m > 0 && entry.mutant.is_none() {
            let aggregate = if n == 1 {
                mutant_x
            } else {
                ((m - 1) as f64 * mutant_x + (n - m) as f64 * incumbent_x) / (n - 1) as f64
            };
            entry.mutant = Some(birth_mean(config, mutant_x, aggregate, n)?);
        }
        if n > m && entry.incumbent.is_none() {
            let aggregate = if n == 1 {
                incumbent_x
            } else {
                (m as f64 * mutant_x + (n - m - 1) as f64 * incumbent_x) / (n - 1) as f64
            };
            entry.incumbent = Some(birth_mean(config, incumbent_x, aggregate, n)?);
        }
        Ok(*entry)
    }

    fn disperse(&mut self, from: usize, offspring: usize, mutant: bool, rate: f64) {
        for _ in 0..offspring {
            let to = if rate > 0.0 && self.rng.gen::<f64>() < rate {
                self.config.migration.destination(&mut self.rng, from)
            } else {
                from
            };
            if mutant {
                self.arriving_mutants[to] += 1;
            } else {
                self.arriving_incumbents[to] += 1;
            }
        }
    }

    /// Arrivals first fill empty places. Whatever is left of the pool then
    /// replaces one uniformly chosen resident: draw the replaced type from
    /// the residents, the replacement's type from the pool, and change the
    /// counts only when the two differ.
    fn settle(&mut self, j: usize) {
        let capacity = self.config.populations[j];
        let (mut res_m, mut res_i) = (self.mutants[j], self.incumbents[j]);
        let (mut pool_m, mut pool_i) = (self.arriving_mutants[j], self.arriving_incumbents[j]);

        while res_m + res_i < capacity && pool_m + pool_i > 0 {
            if self.rng.gen_range(0..pool_m + pool_i) < pool_m {
                pool_m -= 1;
                res_m += 1;
            } else {
                pool_i -= 1;
                res_i += 1;
            }
        }

        if pool_m + pool_i > 0 && res_m + res_i > 0 {
            let replaced_mutant = self.rng.gen_range(0..res_m + res_i) < res_m;
            let arrival_mutant = self.rng.gen_range(0..pool_m + pool_i) < pool_m;
            match (replaced_mutant, arrival_mutant) {
                (false, true) => {
                    res_i -= 1;
                    res_m += 1;
                }
                (true, false) => {
                    res_m -= 1;
                    res_i += 1;
                }
                _ => {}
            }
        }

        self.mutants[j] = res_m;
        self.incumbents[j] = res_i;
    }
}

fn birth_mean(
    config: &ValidatedConfig,
    focal: f64,
    aggregate: f64,
    n: usize,
) -> Result<f64, EvalFault> {
    let alpha = config.source.alpha;
    let delta = config.source.delta;
    if delta == 0.0 {
        return Ok(alpha);
    }
    let payoff = config.program.eval(focal, aggregate, n as f64)?;
    let mean = (alpha * (1.0 + delta * payoff)).max(0.0);
    if mean > MAX_BIRTH_MEAN {
        return Err(EvalFault::BirthMeanOverflow {
            mean,
            x: focal,
            aggregate,
            n: n as f64,
        });
    }
    Ok(mean)
}
