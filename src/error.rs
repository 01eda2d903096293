use crate::expr::{EvalFault, ParseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV Parsing Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error in '{field}': {reason}")]
    Config { field: &'static str, reason: String },

    #[error("Payoff Expression Error: {0}")]
    Parse(#[from] ParseError),

    #[error("Arithmetic Fault: {0}")]
    Arithmetic(#[from] EvalFault),

    #[error("Resource Exhaustion: {0}")]
    Resource(String),
}

impl SimError {
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            field,
            reason: reason.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
