use std::collections::BTreeMap;

use super::{Arc, ArcId, Place, PlaceId, Transition, TransitionId};
use crate::{
    color::{ColorCheck, MultiSet},
    error::{CpnError, Result},
    expr::FunctionTable,
};

/// The immutable structure of a built net.
#[derive(Default, Clone, Debug)]
pub struct CpnNet {
    pub(super) places: BTreeMap<PlaceId, Place>,
    pub(super) transitions: BTreeMap<TransitionId, Transition>,
    pub(super) arcs: BTreeMap<ArcId, Arc>,
    pub(super) variables: BTreeMap<String, ColorCheck>,
    pub(super) functions: FunctionTable,
}

macro_rules! get_place {
    ($self:expr, $place_id:expr) => {
        $self.places.get(&$place_id).ok_or_else(|| {
            CpnError::InconsistentState(format!("Could not find place '{}'", $place_id.0))
        })
    };
}

impl CpnNet {
    pub fn places(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.places.iter().map(|(id, pl)| (*id, pl))
    }

    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.transitions.iter().map(|(id, tr)| (*id, tr))
    }

    pub fn arcs(&self) -> impl Iterator<Item = (ArcId, &Arc)> {
        self.arcs.iter().map(|(id, arc)| (*id, arc))
    }

    pub fn place(&self, id: PlaceId) -> Option<&Place> {
        self.places.get(&id)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(&id)
    }

    pub fn place_by_name(&self, name: &str) -> Option<(PlaceId, &Place)> {
        self.places().find(|(_, pl)| pl.name() == name)
    }

    pub fn transition_by_name(&self, name: &str) -> Option<(TransitionId, &Transition)> {
        self.transitions().find(|(_, tr)| tr.name() == name)
    }

    /// All arcs of a transition, ordered by their `order` hint, then by id.
    pub fn arcs_for(&self, transition: TransitionId) -> Vec<&Arc> {
        let mut arcs: Vec<(ArcId, &Arc)> =
            self.arcs().filter(|(_, arc)| arc.transition() == transition).collect();
        arcs.sort_by_key(|(id, arc)| (arc.order(), *id));
        arcs.into_iter().map(|(_, arc)| arc).collect()
    }

    pub fn input_arcs(&self, transition: TransitionId) -> Vec<&Arc> {
        self.arcs_for(transition).into_iter().filter(|arc| arc.variant().is_in()).collect()
    }

    pub fn output_arcs(&self, transition: TransitionId) -> Vec<&Arc> {
        self.arcs_for(transition).into_iter().filter(|arc| arc.variant().is_out()).collect()
    }

    /// Color set of a declared variable.
    pub fn variable_check(&self, name: &str) -> Option<&ColorCheck> {
        self.variables.get(name)
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Register a native implementation callable from inscriptions.
    pub fn functions_mut(&mut self) -> &mut FunctionTable {
        &mut self.functions
    }

    /// Queryable view of the net combined with a marking.
    pub fn snapshot(&self, marking: &Marking) -> NetSnapshot {
        let places = self
            .places()
            .map(|(id, pl)| PlaceSnapshot {
                id,
                name: pl.name().to_string(),
                colorset: pl.colorset().map(String::from),
                marking: marking.get(id).cloned().unwrap_or_default(),
            })
            .collect();
        let arc_snapshot = |arc: &Arc| ArcSnapshot {
            place: arc.place(),
            place_name: self.place(arc.place()).map(|pl| pl.name().to_string()).unwrap_or_default(),
            variant: arc.variant(),
            expression: arc.expr().source().to_string(),
        };
        let transitions = self
            .transitions()
            .map(|(id, tr)| TransitionSnapshot {
                id,
                name: tr.name().to_string(),
                guard: tr.guard().map(|g| g.source().to_string()),
                priority: tr.priority(),
                inputs: self.input_arcs(id).into_iter().map(arc_snapshot).collect(),
                outputs: self.output_arcs(id).into_iter().map(arc_snapshot).collect(),
            })
            .collect();
        NetSnapshot { places, transitions }
    }
}

/// Token multiset of every place.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct Marking {
    tokens: BTreeMap<PlaceId, MultiSet>,
}

impl Marking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, place: PlaceId) -> Option<&MultiSet> {
        self.tokens.get(&place)
    }

    pub fn set(&mut self, place: PlaceId, tokens: MultiSet) {
        self.tokens.insert(place, tokens);
    }

    pub fn get_mut(&mut self, place: PlaceId) -> &mut MultiSet {
        self.tokens.entry(place).or_default()
    }

    /// Number of tokens in a place, counting multiplicities.
    pub fn count(&self, place: PlaceId) -> usize {
        self.tokens.get(&place).map(MultiSet::len).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, &MultiSet)> {
        self.tokens.iter().map(|(id, ms)| (*id, ms))
    }

    /// Check every token against its place's color set.
    pub fn validate(&self, net: &CpnNet) -> Result<()> {
        for (id, tokens) in self.iter() {
            let place = get_place!(net, id)?;
            if let Some((token, _)) = tokens.iter().find(|(t, _)| !place.check().check(t)) {
                return Err(CpnError::TypeViolation {
                    place: place.name().to_string(),
                    token: token.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PlaceSnapshot {
    pub id: PlaceId,
    pub name: String,
    pub colorset: Option<String>,
    pub marking: MultiSet,
}

#[derive(Clone, Debug)]
pub struct ArcSnapshot {
    pub place: PlaceId,
    pub place_name: String,
    pub variant: super::ArcVariant,
    pub expression: String,
}

#[derive(Clone, Debug)]
pub struct TransitionSnapshot {
    pub id: TransitionId,
    pub name: String,
    pub guard: Option<String>,
    pub priority: u32,
    pub inputs: Vec<ArcSnapshot>,
    pub outputs: Vec<ArcSnapshot>,
}

#[derive(Clone, Debug)]
pub struct NetSnapshot {
    pub places: Vec<PlaceSnapshot>,
    pub transitions: Vec<TransitionSnapshot>,
}

impl NetSnapshot {
    pub fn place(&self, name: &str) -> Option<&PlaceSnapshot> {
        self.places.iter().find(|pl| pl.name == name)
    }

    pub fn transition(&self, name: &str) -> Option<&TransitionSnapshot> {
        self.transitions.iter().find(|tr| tr.name == name)
    }
}
