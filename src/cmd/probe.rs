use crate::reports;
use archipelago::expr::{self, Instr};
use archipelago::{SimError, SimResult};
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Payoff formula over x, X and n
    pub payoff: String,

    #[arg(long, default_value_t = 0.1)]
    pub lower: f64,

    #[arg(long, default_value_t = 1.0)]
    pub upper: f64,

    #[arg(long, default_value_t = 10)]
    pub slices: usize,

    /// Island population sizes to scan, e.g. "10,20"
    #[arg(long, value_delimiter = ',', default_value = "10")]
    pub populations: Vec<usize>,
}

pub fn run(args: ProbeArgs) -> SimResult<()> {
    let program = expr::parse(&args.payoff)?;
    if !(args.lower < args.upper) {
        return Err(SimError::config("bounds", "lower bound must be below upper bound"));
    }

    let unused: Vec<&str> = [
        (Instr::Focal, "x"),
        (Instr::Aggregate, "X"),
        (Instr::Population, "n"),
    ]
    .into_iter()
    .filter(|(instr, _)| !program.uses(*instr))
    .map(|(_, name)| name)
    .collect();
    if !unused.is_empty() {
        println!("Note: payoff does not depend on {}", unused.join(", "));
    }

    let range = expr::scan(
        &program,
        args.lower,
        args.upper,
        args.slices,
        &args.populations,
    )?;
    reports::print_payoff_report(&program, Some(&range));
    Ok(())
}
