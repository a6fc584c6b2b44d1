use tracing::trace;

use crate::{
    error::{CpnError, Result},
    expr::{Binding, Env, EvalError},
    net::{CpnNet, Marking, PlaceChange, PlaceId, TransitionId},
};

/// Fire `transition` under `binding`.
///
/// Returns the successor marking; `marking` itself is never modified, so a
/// failed firing leaves the caller's state untouched.
pub fn fire(
    net: &CpnNet,
    transition: TransitionId,
    binding: &Binding,
    marking: &Marking,
) -> Result<Marking> {
    let tr = net.transition(transition).ok_or_else(|| {
        CpnError::InconsistentState(format!("Could not find transition '{}'", transition.0))
    })?;
    let env = Env::new(binding, net.functions());
    let mut next = marking.clone();

    for arc in net.input_arcs(transition) {
        let consumed = env.multiset(arc.expr().expr())?;
        if !next.get_mut(arc.place()).remove_all(&consumed) {
            return Err(CpnError::InconsistentState(format!(
                "Transition '{}' cannot consume {} from place '{}' under {}",
                tr.name(),
                consumed,
                arc.place().0,
                binding
            )));
        }
        trace!(transition = tr.name(), place = arc.place().0, %consumed, "Consumed tokens.");
    }

    for arc in net.output_arcs(transition) {
        let place = net.place(arc.place()).ok_or_else(|| {
            CpnError::InconsistentState(format!("Could not find place '{}'", arc.place().0))
        })?;
        let produced = env.multiset(arc.expr().expr())?;
        let tokens = next.get_mut(arc.place());
        for (token, count) in produced.iter() {
            let token = place.check().normalize(token.clone());
            if !place.check().check(&token) {
                return Err(CpnError::TypeViolation {
                    place: place.name().to_string(),
                    token: token.to_string(),
                });
            }
            if !tokens.try_add(token, count) {
                return Err(EvalError::Overflow("++".into()).into());
            }
        }
        trace!(transition = tr.name(), place = place.name(), %produced, "Produced tokens.");
    }
    Ok(next)
}

/// Places touched by a transition, with token counts before and after.
pub fn place_changes(
    net: &CpnNet,
    transition: TransitionId,
    before: &Marking,
    after: &Marking,
) -> Vec<PlaceChange> {
    let mut places: Vec<PlaceId> = net.arcs_for(transition).iter().map(|arc| arc.place()).collect();
    places.sort();
    places.dedup();
    places
        .into_iter()
        .map(|place| PlaceChange {
            place,
            name: net.place(place).map(|pl| pl.name().to_string()).unwrap_or_default(),
            before: before.count(place),
            after: after.count(place),
        })
        .collect()
}
