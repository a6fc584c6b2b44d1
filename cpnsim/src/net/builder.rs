use std::collections::{BTreeMap, BTreeSet};

use derive_builder::Builder;
use tracing::{debug, warn};

use super::{
    common::parse_priority, Arc, ArcId, ArcVariant, CpnNet, Marking, Place, PlaceId, Transition,
    TransitionId,
};
use crate::{
    color::{ColorSet, ColorSetTable, MultiSet},
    error::{CpnError, Result},
    expr::{Binding, CompiledExpr, Compiler, Env, Expr, FunctionTable, Scope},
    model::ModelRecords,
};

#[derive(Builder, Clone, Debug)]
pub struct BuildOptions {
    /// Remove the place named `auxiliary_place` and all its arcs before
    /// building.
    #[builder(default)]
    pub drop_auxiliary_place: bool,
    #[builder(setter(into), default = "\"Names\".to_string()")]
    pub auxiliary_place: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions { drop_auxiliary_place: false, auxiliary_place: "Names".to_string() }
    }
}

/// Compile the color sets declared in the model.
pub fn compile_colorsets(records: &ModelRecords) -> ColorSetTable {
    let declared = records.globbox.colsets.iter().filter_map(|record| {
        let cs = ColorSet::from_record(record);
        if cs.is_none() {
            warn!(id = record.id.as_deref(), "Skipping color set without a name.");
        }
        cs
    });
    ColorSetTable::compile(declared)
}

/// Build a net and its initial marking from the model records.
///
/// Building is a pure function of its inputs: every call yields an
/// independent net instance.
pub fn build(records: &ModelRecords, options: &BuildOptions) -> Result<(CpnNet, Marking)> {
    let colorsets = compile_colorsets(records);
    build_with(records, &colorsets, options)
}

/// Like [`build`], with color sets compiled by the caller.
#[tracing::instrument(level = "debug", skip_all)]
pub fn build_with(
    records: &ModelRecords,
    colorsets: &ColorSetTable,
    options: &BuildOptions,
) -> Result<(CpnNet, Marking)> {
    let compiler = Compiler::new(&records.globbox, colorsets);
    let mut net = CpnNet::default();
    let mut marking = Marking::new();

    for func in &records.globbox.functions {
        match (func.name.as_deref(), func.value.as_deref()) {
            (Some(header), Some(body)) => {
                let header = header.trim();
                net.functions.declare(header.strip_prefix("fun ").unwrap_or(header), body);
            }
            _ => warn!(id = func.id.as_deref(), "Skipping function without name or body."),
        }
    }
    for (name, type_name) in compiler.variables() {
        net.variables.insert(name.to_string(), colorsets.check_for(Some(type_name)));
    }

    let mut place_ids = BTreeMap::<String, PlaceId>::new();
    let mut place_names = BTreeSet::<String>::new();
    let mut dropped = BTreeSet::<String>::new();
    for (idx, record) in records.page.places.iter().enumerate() {
        let name = entity_name(record.text.as_deref(), record.place_id.as_deref(), "place", idx);
        if options.drop_auxiliary_place && name == options.auxiliary_place {
            debug!(place = name.as_str(), "Dropping auxiliary place.");
            dropped.extend(record.place_id.as_deref().map(|p| p.trim().to_string()));
            continue;
        }
        let name = unique_name(&mut place_names, name, record.place_id.as_deref(), idx);
        let check = colorsets.check_for(record.type_name.as_deref());
        let place = Place::new(name, record.type_name.as_ref().map(|t| t.trim().to_string()), check)
            .with_source_id(record.place_id.clone());
        let tokens = initial_marking(&compiler, &net.functions, &place, record.initmark.as_deref())?;
        let id = PlaceId(idx as u64);
        if let Some(source_id) = record.place_id.as_ref() {
            place_ids.insert(source_id.trim().to_string(), id);
        }
        debug!(place = place.name(), check = %place.check(), tokens = tokens.len(), "Created place.");
        marking.set(id, tokens);
        net.places.insert(id, place);
    }

    let mut transition_ids = BTreeMap::<String, TransitionId>::new();
    let mut transition_names = BTreeSet::<String>::new();
    for (idx, record) in records.page.transitions.iter().enumerate() {
        let name = entity_name(record.text.as_deref(), record.transition_id.as_deref(), "transition", idx);
        let name = unique_name(&mut transition_names, name, record.transition_id.as_deref(), idx);
        let guard = compiler.compile_guard(record.condition.as_deref());
        if guard.as_ref().is_some_and(CompiledExpr::is_opaque) {
            warn!(transition = name.as_str(), "Guard is not fully supported, it will evaluate as written.");
        }
        let mut transition = Transition::new(name, guard)
            .with_source_id(record.transition_id.clone())
            .with_priority(parse_priority(record.priority.as_deref()));
        transition.time = non_blank(record.time.as_deref());
        transition.code = non_blank(record.code.as_deref());
        let id = TransitionId(idx as u64);
        if let Some(source_id) = record.transition_id.as_ref() {
            transition_ids.insert(source_id.trim().to_string(), id);
        }
        debug!(
            transition = transition.name(),
            guard = transition.guard().map(|g| g.source()),
            priority = transition.priority(),
            "Created transition."
        );
        net.transitions.insert(id, transition);
    }

    for (idx, record) in records.page.arcs.iter().enumerate() {
        let arc_id = record.arc_id.as_deref();
        let Some(variant) = record.orientation.as_deref().and_then(ArcVariant::from_orientation) else {
            warn!(arc = arc_id, orientation = record.orientation.as_deref(), "Dropping arc with unknown orientation.");
            continue;
        };
        let placeend = record.placeend.as_deref().map(str::trim);
        let transend = record.transend.as_deref().map(str::trim);
        if placeend.is_some_and(|p| dropped.contains(p)) {
            debug!(arc = arc_id, "Dropping arc of the auxiliary place.");
            continue;
        }
        let (Some(place), Some(transition)) = (
            placeend.and_then(|p| place_ids.get(p)).copied(),
            transend.and_then(|t| transition_ids.get(t)).copied(),
        ) else {
            warn!(arc = arc_id, placeend, transend, "Dropping arc with unresolved place or transition.");
            continue;
        };
        let order = record.order.as_deref().and_then(|o| o.trim().parse().ok()).unwrap_or(0);
        let expr = match non_blank(record.expression.as_deref()) {
            Some(text) => compiler.compile(&text, Scope::Binding),
            None => CompiledExpr::new("", Expr::Empty),
        };
        if expr.is_opaque() {
            warn!(arc = arc_id, expression = expr.source(), "Arc inscription is not fully supported.");
        }
        net.arcs.insert(ArcId(idx as u64), Arc::new(place, transition, variant, order, expr));
    }

    debug!(
        places = net.places.len(),
        transitions = net.transitions.len(),
        arcs = net.arcs.len(),
        "Built net."
    );
    Ok((net, marking))
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(String::from)
}

fn entity_name(text: Option<&str>, id: Option<&str>, kind: &str, idx: usize) -> String {
    non_blank(text).or_else(|| non_blank(id)).unwrap_or_else(|| format!("{kind}{idx}"))
}

/// Names must be unique within a net. A repeated name is qualified with the
/// entity's source id (or its position).
fn unique_name(taken: &mut BTreeSet<String>, name: String, id: Option<&str>, idx: usize) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let suffix = non_blank(id).unwrap_or_else(|| idx.to_string());
    let mut qualified = format!("{name} ({suffix})");
    let mut n = 1;
    while !taken.insert(qualified.clone()) {
        n += 1;
        qualified = format!("{name} ({suffix}/{n})");
    }
    warn!(name = name.as_str(), renamed = qualified.as_str(), "Name is not unique, qualifying it.");
    qualified
}

/// Evaluate an initial marking and check it against the place's color set.
fn initial_marking(
    compiler: &Compiler,
    functions: &FunctionTable,
    place: &Place,
    initmark: Option<&str>,
) -> Result<MultiSet> {
    let Some(text) = non_blank(initmark) else {
        return Ok(MultiSet::new());
    };
    let compiled = compiler.compile(&text, Scope::Constant);
    let binding = Binding::new();
    let tokens = match Env::new(&binding, functions).multiset(compiled.expr()) {
        Ok(tokens) => tokens,
        Err(err) => {
            warn!(place = place.name(), initmark = text.as_str(), %err, "Initial marking cannot be evaluated, place starts empty.");
            return Ok(MultiSet::new());
        }
    };
    let mut out = MultiSet::new();
    for (token, count) in tokens.iter() {
        let token = place.check().normalize(token.clone());
        if !place.check().check(&token) {
            return Err(CpnError::TypeViolation { place: place.name().to_string(), token: token.to_string() });
        }
        out.add(token, count);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Token;

    const MODEL: &str = r#"{
        "globbox": {
            "colsets": [
                {"name": "INT", "subtype": "int"},
                {"name": "COL", "subtype": "enum", "subtype_contents": ["red", "green"]}
            ],
            "variables": [{"type": "INT", "names": ["x"]}, {"type": "COL", "names": ["c"]}],
            "values": [{"name": "start", "value": "2`1 ++ 1`2"}],
            "functions": [{"name": "fun inc(x)", "value": "x + 1"}]
        },
        "page": {
            "places": [
                {"place_id": "P1", "text": "A", "type": "INT", "initmark": "start"},
                {"place_id": "P2", "text": "B", "type": "COL", "initmark": "1`red"},
                {"place_id": "P3", "text": "Names", "type": "STRING", "initmark": "1`\"n\""}
            ],
            "transitions": [
                {"transition_id": "T1", "text": "T", "condition": "[x = 1]", "priority": "P_HIGH"}
            ],
            "arcs": [
                {"arc_id": "a1", "orientation": "PtoT", "transend": "T1", "placeend": "P1", "expression": "1`x", "order": "2"},
                {"arc_id": "a2", "orientation": "TtoP", "transend": "T1", "placeend": "P2", "expression": "c", "order": "1"},
                {"arc_id": "a3", "orientation": "BOTHDIR", "transend": "T1", "placeend": "P3", "expression": "n"},
                {"arc_id": "a4", "orientation": "PtoT", "transend": "T1", "placeend": "MISSING", "expression": "x"}
            ]
        }
    }"#;

    fn records() -> ModelRecords {
        ModelRecords::from_json_str(MODEL).unwrap()
    }

    #[test]
    fn builds_places_transitions_and_arcs() {
        let (net, marking) = build(&records(), &BuildOptions::default()).unwrap();
        let (a, _) = net.place_by_name("A").unwrap();
        assert_eq!(marking.get(a).unwrap().count(&Token::Int(1)), 2);
        assert_eq!(marking.count(a), 3);
        let (b, _) = net.place_by_name("B").unwrap();
        assert_eq!(marking.get(b).unwrap().count(&Token::str("red")), 1);

        let (t, tr) = net.transition_by_name("T").unwrap();
        assert_eq!(tr.guard().unwrap().source(), "[x = 1]");
        assert_eq!(tr.priority(), crate::net::P_HIGH);
        // a4 is unresolved and dropped, arcs are ordered by their hint
        let arcs = net.arcs_for(t);
        assert_eq!(arcs.len(), 3);
        assert_eq!(arcs[0].variant(), ArcVariant::InOut);
        assert_eq!(arcs[1].variant(), ArcVariant::Out);
        assert_eq!(net.input_arcs(t).len(), 2);
        assert_eq!(net.functions().declared().next().unwrap().name, "inc");
    }

    #[test]
    fn auxiliary_place_can_be_dropped() {
        let options = BuildOptionsBuilder::default().drop_auxiliary_place(true).build().unwrap();
        let (net, _) = build(&records(), &options).unwrap();
        assert!(net.place_by_name("Names").is_none());
        let (t, _) = net.transition_by_name("T").unwrap();
        assert_eq!(net.arcs_for(t).len(), 2);
    }

    #[test]
    fn initial_marking_violations_are_fatal() {
        let mut records = records();
        records.page.places[0].initmark = Some("1`\"abc\"".into());
        let err = build(&records, &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, CpnError::TypeViolation { ref place, .. } if place == "A"));
    }

    #[test]
    fn duplicate_names_are_qualified() {
        let mut records = records();
        records.page.places[1].text = Some("A".into());
        records.page.transitions.push(crate::model::TransitionRecord {
            transition_id: Some("T2".into()),
            text: Some("T".into()),
            ..Default::default()
        });
        let (net, marking) = build(&records, &BuildOptions::default()).unwrap();
        let (a, _) = net.place_by_name("A").unwrap();
        assert_eq!(marking.count(a), 3);
        let (b, _) = net.place_by_name("A (P2)").unwrap();
        assert_eq!(marking.get(b).unwrap().count(&Token::str("red")), 1);
        assert_eq!(net.snapshot(&marking).place("A (P2)").unwrap().id, b);
        assert!(net.transition_by_name("T (T2)").is_some());
        assert_eq!(net.transition_by_name("T").unwrap().0, TransitionId(0));
    }

    #[test]
    fn builds_are_independent() {
        let records = records();
        let (_, mut first) = build(&records, &BuildOptions::default()).unwrap();
        let (_, second) = build(&records, &BuildOptions::default()).unwrap();
        first.set(PlaceId(0), MultiSet::new());
        assert_ne!(first, second);
    }
}
