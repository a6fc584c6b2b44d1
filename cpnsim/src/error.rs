use std::io;

use crate::{
    expr::EvalError,
    net::BuildOptionsBuilderError,
    runner::SimulationConfigBuilderError,
};

#[derive(thiserror::Error, Debug)]
pub enum CpnError {
    #[error("Filesystem error: {0}")]
    IOError(#[from] io::Error),
    #[error("Model could not be decoded: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Malformed model: {0}")]
    MalformedModel(String),
    #[error("Token {token} violates the color set of place '{place}'")]
    TypeViolation { place: String, token: String },
    #[error("Evaluation failed: {0}")]
    Eval(#[from] EvalError),
    #[error("Build configuration error: {0}")]
    BuildConfigError(#[from] BuildOptionsBuilderError),
    #[error("Simulation configuration error: {0}")]
    SimulationConfigError(#[from] SimulationConfigBuilderError),
    #[error("Unknown transition: {0}")]
    UnknownTransition(String),
    #[error("Action Cancelled")]
    Cancelled(),
    #[error("State is inconsistent: {0}")]
    InconsistentState(String),
}

pub type Result<T> = std::result::Result<T, CpnError>;
