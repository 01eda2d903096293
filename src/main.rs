use clap::{Parser, Subcommand};

mod cmd;
mod reports;

#[derive(Parser, Debug)]
#[command(author, version, about = "Island migration invasion simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a simulation and report mean mutant outcomes per incumbent
    Run(cmd::run::RunArgs),
    /// Compile a payoff formula and scan its range over the strategy grid
    Probe(cmd::probe::ProbeArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(args),
        Commands::Probe(args) => cmd::probe::run(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
