//! Parsing of raw extractor output.
//!
//! The extractor answers with a JSON document of the form
//!
//! ```text
//! {
//!   "entities":  { "<label>": [ { "id": ..., "name": ..., ... } ] },
//!   "relations": { "<type>":  [ { "source": ..., "target": ..., ... } ] }
//! }
//! ```
//!
//! Anything that does not have this shape is an [`ExtractionError`]; the page
//! is flagged and retried rather than partially stored.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::ExtractionError;
use crate::mention::Label;

/// An entity as produced by the extractor, before it becomes a mention.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntity {
    /// Extractor id, unique within the page payload.
    pub local_id: String,
    /// Trimmed surface name.
    pub name: String,
    /// Normalized label (`"job title"` -> `JobTitle`).
    pub label: Label,
    /// Titles attached to the entity.
    pub titles: Vec<String>,
    /// The entity's `type` property.
    pub entity_type: Option<String>,
    /// Other scalar properties, kept as strings.
    pub extra: BTreeMap<String, String>,
}

/// A relation as produced by the extractor, endpoints by local id.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRelation {
    /// Local id of the source entity.
    pub source_id: String,
    /// Local id of the target entity.
    pub target_id: String,
    /// Upper snake case type (`"works for"` -> `WORKS_FOR`).
    pub rel_type: String,
    /// Sentiment property, if any.
    pub sentiment: Option<String>,
    /// The relation's `type` property.
    pub conversation_type: Option<String>,
    /// Other scalar properties, kept as strings.
    pub extra: BTreeMap<String, String>,
}

/// The parsed payload of one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Entities in payload order.
    pub entities: Vec<RawEntity>,
    /// Relations in payload order.
    pub relations: Vec<RawRelation>,
}

/// Normalizes an extractor relation type: trimmed, upper-cased, whitespace
/// runs joined with `_`.
#[must_use]
pub fn normalize_relation_type(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join("_")
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn required_id(obj: &Map<String, Value>, keys: &[&str], path: &str) -> Result<String, ExtractionError> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(scalar_to_string))
        .ok_or_else(|| ExtractionError::UnexpectedShape {
            path: path.to_string(),
            reason: format!("missing '{}'", keys[0]),
        })
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ExtractionError> {
    value.as_object().ok_or_else(|| ExtractionError::UnexpectedShape {
        path: path.to_string(),
        reason: "expected an object".to_string(),
    })
}

fn as_array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, ExtractionError> {
    value.as_array().ok_or_else(|| ExtractionError::UnexpectedShape {
        path: path.to_string(),
        reason: "expected an array".to_string(),
    })
}

fn parse_titles(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn parse_entity(label: &Label, raw_label: &str, value: &Value, path: &str) -> Result<RawEntity, ExtractionError> {
    let obj = as_object(value, path)?;
    let local_id = required_id(obj, &["id"], path)?;
    let name = obj
        .get("name")
        .and_then(scalar_to_string)
        .ok_or_else(|| ExtractionError::UnexpectedShape {
            path: path.to_string(),
            reason: "missing 'name'".to_string(),
        })?;

    let mut extra = BTreeMap::new();
    extra.insert("label_raw".to_string(), raw_label.to_string());
    for (key, v) in obj {
        if matches!(key.as_str(), "id" | "name" | "titles" | "type") {
            continue;
        }
        if let Some(s) = scalar_to_string(v) {
            extra.insert(key.clone(), s);
        }
    }

    Ok(RawEntity {
        local_id,
        name,
        label: label.clone(),
        titles: parse_titles(obj.get("titles")),
        entity_type: obj.get("type").and_then(scalar_to_string),
        extra,
    })
}

fn parse_relation(rel_type: &str, raw_type: &str, value: &Value, path: &str) -> Result<RawRelation, ExtractionError> {
    let obj = as_object(value, path)?;
    let source_id = required_id(obj, &["source", "source_id"], path)?;
    let target_id = required_id(obj, &["target", "target_id"], path)?;

    let mut extra = BTreeMap::new();
    extra.insert("type_raw".to_string(), raw_type.to_string());
    for (key, v) in obj {
        if matches!(
            key.as_str(),
            "source" | "source_id" | "target" | "target_id" | "type" | "sentiment"
        ) {
            continue;
        }
        if let Some(s) = scalar_to_string(v) {
            extra.insert(key.clone(), s);
        }
    }

    Ok(RawRelation {
        source_id,
        target_id,
        rel_type: rel_type.to_string(),
        sentiment: obj.get("sentiment").and_then(scalar_to_string),
        // A relation-level "type" property describes the conversation
        // (letter, lunch, phone call); the relation's own type is the key.
        conversation_type: obj.get("type").and_then(scalar_to_string),
        extra,
    })
}

/// Parses raw extractor output for one page.
///
/// # Errors
/// - `InvalidJson` if the output is not JSON
/// - `MissingKey` if `entities` or `relations` is absent
/// - `UnexpectedShape` if a section, entity or relation has the wrong shape
pub fn parse_extraction(output: &str) -> Result<Extraction, ExtractionError> {
    let root: Value = serde_json::from_str(output.trim()).map_err(|e| ExtractionError::InvalidJson {
        message: e.to_string(),
    })?;
    let root = as_object(&root, "$")?;

    let entities = root.get("entities").ok_or(ExtractionError::MissingKey { key: "entities" })?;
    let relations = root.get("relations").ok_or(ExtractionError::MissingKey { key: "relations" })?;

    let mut out = Extraction::default();

    for (raw_label, items) in as_object(entities, "$.entities")? {
        let path = format!("$.entities.{raw_label}");
        let Some(label) = Label::from_extraction(raw_label) else {
            return Err(ExtractionError::UnexpectedShape {
                path,
                reason: "blank label".to_string(),
            });
        };
        for (i, item) in as_array(items, &path)?.iter().enumerate() {
            out.entities
                .push(parse_entity(&label, raw_label, item, &format!("{path}[{i}]"))?);
        }
    }

    for (raw_type, items) in as_object(relations, "$.relations")? {
        let path = format!("$.relations.{raw_type}");
        let rel_type = normalize_relation_type(raw_type);
        if rel_type.is_empty() {
            return Err(ExtractionError::UnexpectedShape {
                path,
                reason: "blank relation type".to_string(),
            });
        }
        for (i, item) in as_array(items, &path)?.iter().enumerate() {
            out.relations
                .push(parse_relation(&rel_type, raw_type, item, &format!("{path}[{i}]"))?);
        }
    }

    Ok(out)
}
