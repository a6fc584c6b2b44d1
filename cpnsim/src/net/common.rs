use std::fmt::Display;

use crate::{color::ColorCheck, expr::CompiledExpr};

#[derive(Eq, PartialEq, Clone, Copy, PartialOrd, Ord, Hash, Debug)]
pub struct PlaceId(pub u64);
#[derive(Eq, PartialEq, Clone, Copy, PartialOrd, Ord, Hash, Debug)]
pub struct TransitionId(pub u64);
#[derive(Eq, PartialEq, Clone, Copy, PartialOrd, Ord, Hash, Debug)]
pub struct ArcId(pub u64);

pub const P_HIGH: u32 = 100;
pub const P_NORMAL: u32 = 1000;
pub const P_LOW: u32 = 10000;

/// Read a transition priority. Lower numbers are more urgent; anything
/// unreadable counts as `P_NORMAL`.
pub fn parse_priority(text: Option<&str>) -> u32 {
    match text.map(str::trim) {
        None | Some("") => P_NORMAL,
        Some("P_HIGH") => P_HIGH,
        Some("P_NORMAL") => P_NORMAL,
        Some("P_LOW") => P_LOW,
        Some(other) => other.parse().unwrap_or(P_NORMAL),
    }
}

#[derive(Clone, Debug)]
pub struct Place {
    name: String,
    source_id: Option<String>,
    colorset: Option<String>,
    check: ColorCheck,
}

impl Place {
    pub fn new(name: impl Into<String>, colorset: Option<String>, check: ColorCheck) -> Self {
        Place { name: name.into(), source_id: None, colorset, check }
    }

    pub fn with_source_id(mut self, id: Option<String>) -> Self {
        self.source_id = id;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the place in the model file.
    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// Name of the declared color set, if the model gave one.
    pub fn colorset(&self) -> Option<&str> {
        self.colorset.as_deref()
    }

    pub fn check(&self) -> &ColorCheck {
        &self.check
    }
}

#[derive(Clone, Debug)]
pub struct Transition {
    name: String,
    source_id: Option<String>,
    guard: Option<CompiledExpr>,
    priority: u32,
    pub(super) time: Option<String>,
    pub(super) code: Option<String>,
}

impl Transition {
    pub fn new(name: impl Into<String>, guard: Option<CompiledExpr>) -> Self {
        Transition {
            name: name.into(),
            source_id: None,
            guard,
            priority: P_NORMAL,
            time: None,
            code: None,
        }
    }

    pub fn with_source_id(mut self, id: Option<String>) -> Self {
        self.source_id = id;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn guard(&self) -> Option<&CompiledExpr> {
        self.guard.as_ref()
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Time inscription. Carried as metadata, never evaluated.
    pub fn time(&self) -> Option<&str> {
        self.time.as_deref()
    }

    /// Code segment. Carried as metadata, never evaluated.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ArcVariant {
    In,
    Out,
    InOut,
}

impl ArcVariant {
    /// Maps the model's orientation tags `PtoT`, `TtoP` and `BOTHDIR`.
    pub fn from_orientation(orientation: &str) -> Option<Self> {
        match orientation.trim() {
            "PtoT" => Some(Self::In),
            "TtoP" => Some(Self::Out),
            "BOTHDIR" => Some(Self::InOut),
            _ => None,
        }
    }

    /// True for all incoming arcs (In | InOut)
    pub fn is_in(&self) -> bool {
        [Self::In, Self::InOut].contains(self)
    }

    /// True for all outgoing arcs (Out | InOut)
    pub fn is_out(&self) -> bool {
        [Self::Out, Self::InOut].contains(self)
    }
}

impl Display for ArcVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArcVariant::In => write!(f, "PtoT"),
            ArcVariant::Out => write!(f, "TtoP"),
            ArcVariant::InOut => write!(f, "BOTHDIR"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Arc {
    place: PlaceId,
    transition: TransitionId,
    variant: ArcVariant,
    order: i64,
    expr: CompiledExpr,
}

impl Arc {
    pub fn new(
        place: PlaceId,
        transition: TransitionId,
        variant: ArcVariant,
        order: i64,
        expr: CompiledExpr,
    ) -> Self {
        Arc { place, transition, variant, order, expr }
    }

    pub fn place(&self) -> PlaceId {
        self.place
    }

    pub fn transition(&self) -> TransitionId {
        self.transition
    }

    pub fn variant(&self) -> ArcVariant {
        self.variant
    }

    /// Tie-break hint from the model; arcs of a transition are visited in
    /// this order.
    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn expr(&self) -> &CompiledExpr {
        &self.expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities() {
        assert_eq!(parse_priority(None), P_NORMAL);
        assert_eq!(parse_priority(Some(" P_HIGH ")), P_HIGH);
        assert_eq!(parse_priority(Some("P_LOW")), P_LOW);
        assert_eq!(parse_priority(Some("5")), 5);
        assert_eq!(parse_priority(Some("urgent")), P_NORMAL);
    }

    #[test]
    fn orientations() {
        assert_eq!(ArcVariant::from_orientation("PtoT"), Some(ArcVariant::In));
        assert!(ArcVariant::from_orientation("BOTHDIR").unwrap().is_in());
        assert!(ArcVariant::from_orientation("BOTHDIR").unwrap().is_out());
        assert!(!ArcVariant::from_orientation("TtoP").unwrap().is_in());
        assert_eq!(ArcVariant::from_orientation("sideways"), None);
    }
}
