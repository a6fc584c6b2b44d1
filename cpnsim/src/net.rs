mod builder;
mod change;
mod common;
mod net_state;

pub use builder::{build, build_with, compile_colorsets, BuildOptions, BuildOptionsBuilder, BuildOptionsBuilderError};
pub use change::{PlaceChange, StepEvent, StepOutcome};
pub use common::{
    parse_priority, Arc, ArcId, ArcVariant, Place, PlaceId, Transition, TransitionId, P_HIGH, P_LOW,
    P_NORMAL,
};
pub use net_state::{
    ArcSnapshot, CpnNet, Marking, NetSnapshot, PlaceSnapshot, TransitionSnapshot,
};
