use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ConfigError, ConfigResult};
use crate::export::config::{merge_maps, FindOptions, FormatSettings};
use crate::export::fields::ResolvedField;

/// The only option keys a run recognizes. Anything else in an inherited or
/// explicit options map is discarded during normalization.
pub const RECOGNIZED_OPTION_KEYS: [&str; 10] = [
    "conditions",
    "fields",
    "joins",
    "limit",
    "offset",
    "order",
    "page",
    "group",
    "callbacks",
    "contain",
];

/// The canonical option set for one run. Owned exclusively by the run; the
/// engine is the only mutator of `page`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub conditions: Map<String, Value>,
    pub fields: Vec<String>,
    pub joins: Vec<Value>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order: Vec<String>,
    pub group: Option<String>,
    /// Page cursor. Starts at 1 and increments by exactly 1 per fetch.
    pub page: u32,
    pub callbacks: bool,
    pub contain: Vec<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            conditions: Map::new(),
            fields: Vec::new(),
            joins: Vec::new(),
            limit: None,
            offset: None,
            order: Vec::new(),
            group: None,
            page: 1,
            callbacks: true,
            contain: Vec::new(),
        }
    }
}

impl QueryOptions {
    /// Normalize a raw options map: keep only recognized keys, coerce the
    /// loose shapes callers use (scalar-or-list order/contain, map order),
    /// and fill everything missing from defaults.
    pub fn from_map(raw: &Map<String, Value>) -> ConfigResult<Self> {
        let mut options = QueryOptions::default();
        for (key, value) in raw {
            if !RECOGNIZED_OPTION_KEYS.contains(&key.as_str()) {
                continue;
            }
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "conditions" => {
                    options.conditions = value
                        .as_object()
                        .cloned()
                        .ok_or_else(|| invalid(key, value))?;
                }
                "fields" => {
                    options.fields = string_list(value).ok_or_else(|| invalid(key, value))?;
                }
                "joins" => {
                    options.joins = value
                        .as_array()
                        .cloned()
                        .ok_or_else(|| invalid(key, value))?;
                }
                "limit" => {
                    options.limit = Some(positive_int(value).ok_or_else(|| invalid(key, value))?);
                }
                "offset" => {
                    options.offset =
                        Some(value.as_u64().ok_or_else(|| invalid(key, value))? as u32);
                }
                "order" => {
                    options.order = order_list(value).ok_or_else(|| invalid(key, value))?;
                }
                "group" => {
                    options.group = Some(
                        value
                            .as_str()
                            .map(str::to_string)
                            .ok_or_else(|| invalid(key, value))?,
                    );
                }
                "page" => {
                    options.page = positive_int(value).ok_or_else(|| invalid(key, value))?;
                }
                "callbacks" => {
                    options.callbacks = value.as_bool().ok_or_else(|| invalid(key, value))?;
                }
                "contain" => {
                    options.contain = string_list(value).ok_or_else(|| invalid(key, value))?;
                }
                _ => unreachable!("key checked against RECOGNIZED_OPTION_KEYS"),
            }
        }
        Ok(options)
    }
}

fn invalid(key: &str, value: &Value) -> ConfigError {
    ConfigError::InvalidOptions(format!("unusable value for '{}': {}", key, value))
}

fn positive_int(value: &Value) -> Option<u32> {
    value.as_u64().filter(|n| *n > 0).map(|n| n as u32)
}

/// A single string or a list of strings.
fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

/// Order clauses arrive as a string, a list of strings, or a map of
/// field to direction; all collapse to `field DIRECTION` strings.
fn order_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(_) | Value::Array(_) => string_list(value),
        Value::Object(map) => map
            .iter()
            .map(|(field, direction)| {
                direction
                    .as_str()
                    .map(|d| format!("{} {}", field, d))
            })
            .collect(),
        _ => None,
    }
}

/// Produce the finalized options for one run.
///
/// The caller's pagination state is an explicit parameter; a sub-block keyed
/// by the primary model is deep-merged on top of it before normalization.
/// A configured chunk size overwrites only the `limit` key, nothing else.
pub fn build_query_options(
    primary_model: &str,
    settings: &FormatSettings,
    projection: &[ResolvedField],
    caller_pagination: Option<&Value>,
) -> ConfigResult<QueryOptions> {
    let source = match &settings.find_options {
        FindOptions::Explicit(map) => map.clone(),
        FindOptions::Inherit => {
            let base = match caller_pagination {
                Some(Value::Object(map)) => map.clone(),
                Some(_) => {
                    return Err(ConfigError::InvalidOptions(
                        "caller pagination state must be a map".to_string(),
                    ))
                }
                None => Map::new(),
            };
            match base.get(primary_model).cloned() {
                Some(Value::Object(model_block)) => merge_maps(&base, &model_block),
                _ => base,
            }
        }
    };

    let mut options = QueryOptions::from_map(&source)?;

    // A configured chunk size replaces the inherited limit and nothing else;
    // the rest of the option set must survive intact.
    if let Some(chunk_size) = settings.limit {
        options.limit = Some(chunk_size);
    }

    if options.fields.is_empty() && !projection.is_empty() {
        for field in projection {
            if field.model != primary_model && !options.contain.contains(&field.model) {
                options.contain.push(field.model.clone());
            }
            options.fields.push(field.qualified_name());
        }
    }

    options.page = 1;
    Ok(options)
}
