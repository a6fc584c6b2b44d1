//! Binding search.
//!
//! Candidate bindings are found by matching the patterns of the input arcs
//! against the distinct tokens of their places. Candidates of different terms
//! and arcs are merged by unification. Variables no pattern binds are
//! enumerated over their color set when it is finite. Every merged candidate
//! is then verified: the multisets demanded by all input arcs must be
//! contained in the marking and the guard must evaluate to true.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::{
    color::{MultiSet, Token},
    expr::{BinOp, Binding, Env, Expr},
    net::{Arc, CpnNet, Marking, PlaceId, TransitionId},
};

/// A transition together with one of its enabled bindings.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct EnabledPair {
    pub transition: TransitionId,
    pub binding: Binding,
}

/// One term `n`pattern` of an arc inscription.
struct Term<'a> {
    /// Multiplicity when it is a literal, 1 otherwise.
    count: usize,
    pattern: &'a Expr,
}

/// Split an inscription into its multiset terms. Terms that cannot be
/// decomposed before binding (conditionals, calls) contribute nothing here
/// and are only checked during verification.
fn terms(expr: &Expr) -> Vec<Term<'_>> {
    match expr {
        Expr::Empty | Expr::Conditional { .. } => vec![],
        Expr::BinOp { op: BinOp::Union, left, right } => {
            let mut out = terms(left);
            out.extend(terms(right));
            out
        }
        Expr::Multiplicity { count, value } => {
            let count = match count.as_ref() {
                Expr::Literal(Token::Int(n)) => (*n).max(0) as usize,
                _ => 1,
            };
            if count == 0 {
                return vec![];
            }
            match value.as_ref() {
                // `n`(a ++ b)` demands n of every inner term
                inner @ (Expr::BinOp { op: BinOp::Union, .. } | Expr::Multiplicity { .. }) => terms(inner)
                    .into_iter()
                    .map(|t| Term { count: t.count.saturating_mul(count), pattern: t.pattern })
                    .collect(),
                pattern => vec![Term { count, pattern }],
            }
        }
        pattern => vec![Term { count: 1, pattern }],
    }
}

/// Match a pattern against a token, extending `binding`.
///
/// Sub-expressions that are not patterns (arithmetic, calls, field access)
/// match anything without binding; the verification step evaluates them.
pub fn match_pattern(pattern: &Expr, token: &Token, binding: &mut Binding) -> bool {
    match (pattern, token) {
        (Expr::Var(name), _) => binding.unify(name, token),
        (Expr::Wildcard, _) => true,
        (Expr::Literal(expected), _) => expected == token,
        (Expr::Tuple(items), Token::Tuple(values)) | (Expr::List(items), Token::List(values)) => {
            items.len() == values.len()
                && items.iter().zip(values).all(|(item, value)| match_pattern(item, value, binding))
        }
        (Expr::Tuple(_) | Expr::List(_), _) => false,
        (Expr::BinOp { op: BinOp::Cons, left, right }, Token::List(values)) => match values.split_first() {
            Some((head, rest)) => {
                match_pattern(left, head, binding)
                    && match_pattern(right, &Token::List(rest.to_vec()), binding)
            }
            None => false,
        },
        (Expr::BinOp { op: BinOp::Cons, .. }, _) => false,
        (Expr::Record(fields), Token::Record(_)) => fields.iter().all(|(name, item)| match token.field(name) {
            Some(value) => match_pattern(item, value, binding),
            None => false,
        }),
        (Expr::Record(_), _) => false,
        _ => true,
    }
}

/// All bindings of `term` against the tokens of one place.
fn term_candidates(term: &Term, tokens: &MultiSet) -> BTreeSet<Binding> {
    if term.pattern.free_vars().is_empty() {
        return BTreeSet::from([Binding::new()]);
    }
    tokens
        .iter()
        .filter(|(_, count)| *count >= term.count)
        .filter_map(|(token, _)| {
            let mut binding = Binding::new();
            match_pattern(term.pattern, token, &mut binding).then_some(binding)
        })
        .collect()
}

/// Merge two candidate sets, keeping only consistent pairs.
fn join(left: BTreeSet<Binding>, right: &BTreeSet<Binding>) -> BTreeSet<Binding> {
    left.iter().flat_map(|l| right.iter().filter_map(move |r| l.merged(r))).collect()
}

fn free_vars(net: &CpnNet, transition: TransitionId, arcs: &[&Arc]) -> BTreeSet<String> {
    let mut vars: BTreeSet<String> = arcs.iter().flat_map(|arc| arc.expr().free_vars()).collect();
    if let Some(guard) = net.transition(transition).and_then(|tr| tr.guard()) {
        vars.extend(guard.free_vars());
    }
    vars
}

/// Bind the remaining free variables over their finite color sets. Returns
/// None if some variable has no finite domain.
fn enumerate_unbound(
    net: &CpnNet,
    binding: Binding,
    vars: &BTreeSet<String>,
) -> Option<BTreeSet<Binding>> {
    let mut out = BTreeSet::from([binding]);
    for name in vars {
        if out.first().is_some_and(|b| b.contains(name)) {
            continue;
        }
        let domain = net.variable_check(name).and_then(|check| check.domain())?;
        let options: BTreeSet<Binding> =
            domain.into_iter().map(|token| Binding::from_iter([(name.as_str(), token)])).collect();
        out = join(out, &options);
    }
    Some(out)
}

/// Check token availability and the guard for a complete candidate.
fn verify(net: &CpnNet, marking: &Marking, transition: TransitionId, inputs: &[&Arc], binding: &Binding) -> bool {
    let env = Env::new(binding, net.functions());
    let mut demand = BTreeMap::<PlaceId, MultiSet>::new();
    for arc in inputs {
        match env.multiset(arc.expr().expr()) {
            Ok(tokens) => demand.entry(arc.place()).or_default().extend(tokens),
            Err(err) => {
                trace!(%binding, %err, "Input inscription cannot be evaluated.");
                return false;
            }
        }
    }
    let empty = MultiSet::new();
    for (place, tokens) in &demand {
        if !marking.get(*place).unwrap_or(&empty).contains(tokens) {
            return false;
        }
    }
    match net.transition(transition).and_then(|tr| tr.guard()) {
        None => true,
        Some(guard) => match env.boolean(guard.expr(), "guard") {
            Ok(satisfied) => satisfied,
            Err(err) => {
                trace!(%binding, guard = guard.source(), %err, "Guard cannot be evaluated.");
                false
            }
        },
    }
}

/// All bindings that enable `transition` in `marking`, without duplicates,
/// in a deterministic order.
pub fn enabled(net: &CpnNet, marking: &Marking, transition: TransitionId) -> Vec<Binding> {
    let arcs = net.arcs_for(transition);
    let inputs: Vec<&Arc> = arcs.iter().copied().filter(|arc| arc.variant().is_in()).collect();
    let empty = MultiSet::new();

    let mut candidates = BTreeSet::from([Binding::new()]);
    for arc in &inputs {
        let tokens = marking.get(arc.place()).unwrap_or(&empty);
        for term in terms(arc.expr().expr()) {
            candidates = join(candidates, &term_candidates(&term, tokens));
            if candidates.is_empty() {
                return vec![];
            }
        }
    }

    let vars = free_vars(net, transition, &arcs);
    let mut result = BTreeSet::new();
    for candidate in candidates {
        let complete = if vars.iter().all(|v| candidate.contains(v)) {
            BTreeSet::from([candidate])
        } else {
            match enumerate_unbound(net, candidate.clone(), &vars) {
                Some(complete) => complete,
                None => {
                    debug!(transition = transition.0, %candidate, "Discarding binding that leaves variables unbound.");
                    continue;
                }
            }
        };
        result.extend(complete.into_iter().filter(|b| verify(net, marking, transition, &inputs, b)));
    }
    result.into_iter().collect()
}

/// Enabled (transition, binding) pairs over all transitions.
pub fn enabled_pairs(net: &CpnNet, marking: &Marking) -> Vec<EnabledPair> {
    net.transitions()
        .flat_map(|(transition, _)| {
            enabled(net, marking, transition).into_iter().map(move |binding| EnabledPair { transition, binding })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::ModelRecords,
        net::{build, BuildOptions},
    };

    fn net(places: &str, transitions: &str, arcs: &str) -> (CpnNet, Marking) {
        let json = format!(
            r#"{{
                "globbox": {{
                    "colsets": [
                        {{"name": "INT", "subtype": "int"}},
                        {{"name": "BOOL", "subtype": "bool"}},
                        {{"name": "PAIR", "subtype": "product", "subtype_contents": ["INT", "INT"]}},
                        {{"name": "INTS", "subtype": "list", "subtype_contents": ["INT"]}},
                        {{"name": "PERSON", "subtype": "record", "subtype_contents": ["name", "age"]}},
                        {{"name": "STRING", "subtype": "string"}},
                        {{"name": "UNIT", "subtype": "unit"}}
                    ],
                    "variables": [
                        {{"type": "INT", "names": ["x", "y", "n"]}},
                        {{"type": "BOOL", "names": ["b"]}},
                        {{"type": "INTS", "names": ["rest"]}},
                        {{"type": "STRING", "names": ["s"]}}
                    ]
                }},
                "page": {{"places": [{places}], "transitions": [{transitions}], "arcs": [{arcs}]}}
            }}"#
        );
        build(&ModelRecords::from_json_str(&json).unwrap(), &BuildOptions::default()).unwrap()
    }

    fn bindings(net: &CpnNet, marking: &Marking) -> Vec<String> {
        enabled(net, marking, TransitionId(0)).iter().map(|b| b.to_string()).collect()
    }

    #[test]
    fn shared_variables_are_unified() {
        let (net, marking) = net(
            r#"{"place_id": "A", "text": "A", "type": "INT", "initmark": "1`1 ++ 1`2"},
               {"place_id": "B", "text": "B", "type": "INT", "initmark": "1`2 ++ 1`3"}"#,
            r#"{"transition_id": "T", "text": "T"}"#,
            r#"{"orientation": "PtoT", "transend": "T", "placeend": "A", "expression": "x"},
               {"orientation": "PtoT", "transend": "T", "placeend": "B", "expression": "x"}"#,
        );
        assert_eq!(bindings(&net, &marking), vec!["{x=2}"]);
    }

    #[test]
    fn tuple_slots_bind_and_filter() {
        let (net, marking) = net(
            r#"{"place_id": "A", "text": "A", "type": "PAIR", "initmark": "1`(1, 5) ++ 1`(2, 6) ++ 1`(1, 7)"}"#,
            r#"{"transition_id": "T", "text": "T"}"#,
            r#"{"orientation": "PtoT", "transend": "T", "placeend": "A", "expression": "(1, y)"}"#,
        );
        assert_eq!(bindings(&net, &marking), vec!["{y=5}", "{y=7}"]);
    }

    #[test]
    fn two_variables_on_one_place_need_distinct_tokens() {
        let (net, marking) = net(
            r#"{"place_id": "A", "text": "A", "type": "INT", "initmark": "1`1 ++ 1`2"}"#,
            r#"{"transition_id": "T", "text": "T"}"#,
            r#"{"orientation": "PtoT", "transend": "T", "placeend": "A", "expression": "1`x ++ 1`y"}"#,
        );
        // x = y would need two copies of the same token
        assert_eq!(bindings(&net, &marking), vec!["{x=1, y=2}", "{x=2, y=1}"]);
    }

    #[test]
    fn finite_variables_are_enumerated() {
        let (net, marking) = net(
            r#"{"place_id": "A", "text": "A", "type": "INT", "initmark": "1`1"},
               {"place_id": "B", "text": "B", "type": "BOOL"}"#,
            r#"{"transition_id": "T", "text": "T", "condition": "[b]"}"#,
            r#"{"orientation": "PtoT", "transend": "T", "placeend": "A", "expression": "x"},
               {"orientation": "TtoP", "transend": "T", "placeend": "B", "expression": "b"}"#,
        );
        assert_eq!(bindings(&net, &marking), vec!["{b=true, x=1}"]);
    }

    #[test]
    fn unbound_infinite_variables_disable() {
        let (net, marking) = net(
            r#"{"place_id": "A", "text": "A", "type": "INT", "initmark": "1`1"}"#,
            r#"{"transition_id": "T", "text": "T"}"#,
            r#"{"orientation": "PtoT", "transend": "T", "placeend": "A", "expression": "x"},
               {"orientation": "TtoP", "transend": "T", "placeend": "A", "expression": "y"}"#,
        );
        assert!(bindings(&net, &marking).is_empty());
    }

    #[test]
    fn cons_patterns_and_computed_terms() {
        let (net, marking) = net(
            r#"{"place_id": "A", "text": "A", "type": "INTS", "initmark": "1`[1, 2, 3] ++ 1`[]"},
               {"place_id": "B", "text": "B", "type": "INT", "initmark": "1`2"}"#,
            r#"{"transition_id": "T", "text": "T"}"#,
            r#"{"orientation": "PtoT", "transend": "T", "placeend": "A", "expression": "x::rest"},
               {"orientation": "PtoT", "transend": "T", "placeend": "B", "expression": "x + 1"}"#,
        );
        assert_eq!(bindings(&net, &marking), vec!["{rest=[2,3], x=1}"]);
    }

    #[test]
    fn record_patterns_ignore_field_order() {
        let (net, marking) = net(
            r#"{"place_id": "A", "text": "A", "type": "PERSON", "initmark": "1`{name = \"bob\", age = 3}"}"#,
            r#"{"transition_id": "T", "text": "T"}"#,
            r#"{"orientation": "PtoT", "transend": "T", "placeend": "A", "expression": "{age = x, name = s}"}"#,
        );
        assert_eq!(bindings(&net, &marking), vec!["{s=\"bob\", x=3}"]);
    }

    #[test]
    fn unit_tokens_enable() {
        let (net, marking) = net(
            r#"{"place_id": "A", "text": "A", "type": "UNIT", "initmark": "1`unit"},
               {"place_id": "B", "text": "B", "type": "UNIT"}"#,
            r#"{"transition_id": "T", "text": "T"}"#,
            r#"{"orientation": "PtoT", "transend": "T", "placeend": "A", "expression": "unit"},
               {"orientation": "TtoP", "transend": "T", "placeend": "B", "expression": "1`unit"}"#,
        );
        assert_eq!(marking.get(PlaceId(0)), Some(&MultiSet::singleton(Token::Unit)));
        assert_eq!(bindings(&net, &marking), vec!["{}"]);
    }

    #[test]
    fn huge_demands_disable_without_overflow() {
        let (net, marking) = net(
            r#"{"place_id": "A", "text": "A", "type": "INT", "initmark": "1`1"}"#,
            r#"{"transition_id": "T", "text": "T"}"#,
            r#"{"orientation": "PtoT", "transend": "T", "placeend": "A", "expression": "4611686018427387904`(4`x)"}"#,
        );
        assert!(bindings(&net, &marking).is_empty());
    }

    #[test]
    fn terms_of_nested_multiplicities() {
        let expr = crate::expr::parse("2`(1`x ++ 1`y) ++ z").unwrap();
        let counts: Vec<usize> = terms(&expr).iter().map(|t| t.count).collect();
        assert_eq!(counts, vec![2, 2, 1]);
    }
}
