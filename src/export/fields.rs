use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ConfigError, ConfigResult};
use crate::types::Row;

/// A named value transform applied to a field before rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decorator {
    /// Truthy values render as `Yes`, everything else as `No`.
    YesNo,
    Uppercase,
    Lowercase,
}

impl Decorator {
    pub fn apply(&self, value: &Value) -> Value {
        match self {
            Decorator::YesNo => {
                let truthy = match value {
                    Value::Bool(b) => *b,
                    Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                    Value::String(s) => !s.is_empty() && s != "0" && s != "false",
                    Value::Null => false,
                    _ => true,
                };
                Value::String(if truthy { "Yes" } else { "No" }.to_string())
            }
            Decorator::Uppercase => Value::String(render_value(value).to_uppercase()),
            Decorator::Lowercase => Value::String(render_value(value).to_lowercase()),
        }
    }
}

/// One configured projection entry. The shape is decided once, when the
/// settings are deserialized, never re-inspected later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldEntry {
    Decorated {
        field: String,
        label: String,
        decorator: Decorator,
    },
    Labeled {
        field: String,
        label: String,
    },
    Plain(String),
}

/// A projection entry after model qualification and labeling.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub model: String,
    pub field: String,
    pub label: String,
    pub decorator: Option<Decorator>,
}

impl ResolvedField {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.model, self.field)
    }
}

/// Resolve configured entries against the primary model.
///
/// Unqualified names are attributed to the primary model. Entries missing a
/// label get a humanized form of the field name.
pub fn resolve_fields(
    primary_model: &str,
    entries: &[FieldEntry],
) -> ConfigResult<Vec<ResolvedField>> {
    entries
        .iter()
        .map(|entry| {
            let (name, label, decorator) = match entry {
                FieldEntry::Plain(name) => (name.as_str(), None, None),
                FieldEntry::Labeled { field, label } => {
                    (field.as_str(), Some(label.clone()), None)
                }
                FieldEntry::Decorated {
                    field,
                    label,
                    decorator,
                } => (field.as_str(), Some(label.clone()), Some(*decorator)),
            };
            let (model, field) = split_qualified(primary_model, name)?;
            let label = label.unwrap_or_else(|| humanize(&field));
            Ok(ResolvedField {
                model,
                field,
                label,
                decorator,
            })
        })
        .collect()
}

fn split_qualified(primary_model: &str, name: &str) -> ConfigResult<(String, String)> {
    if name.is_empty() {
        return Err(ConfigError::MalformedField("empty field name".to_string()));
    }
    let mut parts = name.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(field), None, _) => Ok((primary_model.to_string(), field.to_string())),
        (Some(model), Some(field), None) if !model.is_empty() && !field.is_empty() => {
            Ok((model.to_string(), field.to_string()))
        }
        _ => Err(ConfigError::MalformedField(name.to_string())),
    }
}

/// `email_address` becomes `Email Address`.
fn humanize(field: &str) -> String {
    field
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Look up one projected cell in a row. Tries the qualified name, then the
/// bare field name, then a nested per-model map.
pub fn project_cell(row: &Row, field: &ResolvedField) -> Value {
    if let Some(value) = row.get(&field.qualified_name()) {
        return value.clone();
    }
    if let Some(value) = row.get(&field.field) {
        return value.clone();
    }
    if let Some(Value::Object(nested)) = row.get(&field.model) {
        if let Some(value) = nested.get(&field.field) {
            return value.clone();
        }
    }
    Value::Null
}

/// Flatten a JSON value into the string written to one CSV cell.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
