//! Flat model records as produced by the model loader.
//!
//! The loader walks the model file and hands over one record per declaration or
//! net element. Every per-entity field is optional: a malformed entity degrades
//! to absent values rather than failing the whole load. Only a missing
//! top-level block (`globbox` or `page`) is fatal.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{CpnError, Result};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ColorSetRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub layout: Option<String>,
    pub subtype: Option<String>,
    pub subtype_contents: Option<Vec<String>>,
    pub index_values: Option<IndexValues>,
}

/// Extra data of `index` color sets. Kept for completeness, the type system
/// treats `index` as unchecked.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct IndexValues {
    pub idx: Vec<i64>,
    pub name_of_object: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct VariableRecord {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub names: Vec<String>,
    pub layout: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValueRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub value: Option<String>,
    pub layout: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FunctionRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub value: Option<String>,
    pub layout: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlaceRecord {
    pub place_id: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub initmark: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransitionRecord {
    pub transition_id: Option<String>,
    pub text: Option<String>,
    pub condition: Option<String>,
    pub time: Option<String>,
    pub code: Option<String>,
    pub priority: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ArcRecord {
    pub arc_id: Option<String>,
    pub orientation: Option<String>,
    pub order: Option<String>,
    pub transend: Option<String>,
    pub placeend: Option<String>,
    pub expression: Option<String>,
}

/// Declarations block.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GlobBox {
    pub colsets: Vec<ColorSetRecord>,
    pub variables: Vec<VariableRecord>,
    pub values: Vec<ValueRecord>,
    pub functions: Vec<FunctionRecord>,
}

/// Net structure block.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Page {
    pub places: Vec<PlaceRecord>,
    pub transitions: Vec<TransitionRecord>,
    pub arcs: Vec<ArcRecord>,
}

#[derive(Deserialize)]
struct RawModel {
    globbox: Option<GlobBox>,
    page: Option<Page>,
}

/// All records of one model.
#[derive(Clone, Debug, Default)]
pub struct ModelRecords {
    pub globbox: GlobBox,
    pub page: Page,
}

impl ModelRecords {
    pub fn from_json_str(json: &str) -> Result<ModelRecords> {
        let raw: RawModel = serde_json::from_str(json)?;
        let globbox = raw
            .globbox
            .ok_or_else(|| CpnError::MalformedModel("the model has no 'globbox' block".into()))?;
        let page = raw
            .page
            .ok_or_else(|| CpnError::MalformedModel("the model has no 'page' block".into()))?;
        debug!(
            colsets = globbox.colsets.len(),
            variables = globbox.variables.len(),
            values = globbox.values.len(),
            functions = globbox.functions.len(),
            places = page.places.len(),
            transitions = page.transitions.len(),
            arcs = page.arcs.len(),
            "Loaded model records."
        );
        Ok(ModelRecords { globbox, page })
    }

    pub fn from_path(path: &Path) -> Result<ModelRecords> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_blocks_are_fatal() {
        let err = ModelRecords::from_json_str(r#"{"page": {}}"#).unwrap_err();
        assert!(matches!(err, CpnError::MalformedModel(_)));
        let err = ModelRecords::from_json_str(r#"{"globbox": {}}"#).unwrap_err();
        assert!(matches!(err, CpnError::MalformedModel(_)));
    }

    #[test]
    fn malformed_entities_degrade_to_defaults() {
        let model = ModelRecords::from_json_str(
            r#"{
                "globbox": {"colsets": [{"name": "INT", "subtype": "int"}, {}]},
                "page": {"places": [{"text": "A"}], "arcs": [{"orientation": "PtoT"}]}
            }"#,
        )
        .unwrap();
        assert_eq!(model.globbox.colsets.len(), 2);
        assert_eq!(model.globbox.colsets[1].name, None);
        assert_eq!(model.page.places[0].type_name, None);
        assert_eq!(model.page.arcs[0].placeend, None);
        assert!(model.page.transitions.is_empty());
    }
}
