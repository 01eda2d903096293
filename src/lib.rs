pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod fit;
pub mod loader;
pub mod poisson;
pub mod snapshot;
pub mod stats;
pub mod topology;

pub use config::SimulationConfig;
pub use engine::{start_simulation, SimStatus, SimulationHandle};
pub use error::{SimError, SimResult};
