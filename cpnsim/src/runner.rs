mod main;
mod policy;
mod veto;

pub use main::{
    SimulationConfig, SimulationConfigBuilder, SimulationConfigBuilderError, SimulationReport,
    SimulationState, Simulator, StopReason,
};
pub use policy::{FirstEnabled, Manual, Operator, SelectionPolicy, UniformRandom};
pub use veto::{CoinFlip, RequireEqual, Verdict, VetoHook, VetoRegistry};
