pub mod color;
pub mod error;
pub mod exec;
pub mod expr;
pub mod model;
pub mod net;
pub mod runner;

use std::path::Path;

pub use color::{ColorCheck, MultiSet, Token};
pub use error::{CpnError, Result};
pub use expr::Binding;
pub use model::ModelRecords;
pub use net::{BuildOptions, BuildOptionsBuilder, CpnNet, Marking};
pub use runner::{SimulationConfig, SimulationConfigBuilder, Simulator};

/// Load a model file and build its net and initial marking.
pub fn load(path: &Path, options: &BuildOptions) -> Result<(CpnNet, Marking)> {
    let records = ModelRecords::from_path(path)?;
    net::build(&records, options)
}
