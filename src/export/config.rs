use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ConfigError, ConfigResult};
use crate::export::fields::FieldEntry;
use crate::export::types::TextEncoding;

/// Where a run's query options come from.
///
/// `Inherit` copies the caller's pagination state (passed explicitly into the
/// options builder); `Explicit` carries a literal options map from
/// configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum FindOptions {
    Inherit,
    Explicit(Map<String, Value>),
}

impl Default for FindOptions {
    fn default() -> Self {
        Self::Inherit
    }
}

impl Serialize for FindOptions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            FindOptions::Inherit => serializer.serialize_str("inherit"),
            FindOptions::Explicit(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FindOptions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, MapAccess, Visitor};
        use std::fmt;

        struct FindOptionsVisitor;

        impl<'de> Visitor<'de> for FindOptionsVisitor {
            type Value = FindOptions;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("the string \"inherit\" or an options map")
            }

            fn visit_str<E>(self, value: &str) -> Result<FindOptions, E>
            where
                E: de::Error,
            {
                match value {
                    "inherit" => Ok(FindOptions::Inherit),
                    other => Err(de::Error::unknown_variant(other, &["inherit"])),
                }
            }

            fn visit_map<V>(self, mut access: V) -> Result<FindOptions, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut map = Map::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    map.insert(key, value);
                }
                Ok(FindOptions::Explicit(map))
            }
        }

        deserializer.deserialize_any(FindOptionsVisitor)
    }
}

/// Per-run, per-format settings. Immutable once resolved; nothing here is
/// shared between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatSettings {
    /// Whether the dispatcher may trigger this format automatically from a
    /// route extension.
    pub auto: bool,
    /// Query-option source for the run.
    pub find_options: FindOptions,
    /// Field projection; empty means "export whatever the query returns".
    pub fields: Vec<FieldEntry>,
    /// Chunk size. Overrides the inherited query limit when set.
    pub limit: Option<u32>,
    /// Name the current chunk is bound to when handed to the writer.
    pub data_var_name: String,
    /// Layout override for template-backed writers.
    pub layout: Option<String>,
    /// View override for template-backed writers.
    pub view_file: Option<String>,
    /// Attachment file name template. Recognized placeholders:
    /// `%controllerName%`, `%conditions%`, `%dateTime%`.
    pub file_name_format: String,
    /// Encoding of the download body.
    pub char_encoding: TextEncoding,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            auto: false,
            find_options: FindOptions::Inherit,
            fields: Vec::new(),
            limit: Some(500),
            data_var_name: "data".to_string(),
            layout: None,
            view_file: None,
            file_name_format: "%controllerName%-%dateTime%".to_string(),
            char_encoding: TextEncoding::Utf16Le,
        }
    }
}

/// Recursive deep merge of two JSON values. Objects merge key-by-key, any
/// other pair is replaced by the overlay. Order-sensitive: the overlay wins.
pub fn merge_values(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            Value::Object(merge_maps(base_map, overlay_map))
        }
        (_, replacement) => replacement.clone(),
    }
}

/// Deep merge specialized to two object maps.
pub fn merge_maps(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        let next = match merged.get(key) {
            Some(existing) => merge_values(existing, value),
            None => value.clone(),
        };
        merged.insert(key.clone(), next);
    }
    merged
}

/// Resolve the settings for one format by layering built-in defaults, the
/// cross-format overrides, and the format-specific overrides, in that order.
pub fn resolve_settings(
    format: &str,
    shared_overrides: &Value,
    format_overrides: &Value,
) -> ConfigResult<FormatSettings> {
    let defaults = serde_json::to_value(FormatSettings::default()).map_err(|e| {
        ConfigError::MalformedSettings {
            format: format.to_string(),
            message: e.to_string(),
        }
    })?;

    let merged = merge_values(&merge_values(&defaults, shared_overrides), format_overrides);

    serde_json::from_value(merged).map_err(|e| ConfigError::MalformedSettings {
        format: format.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_later_layer_wins() {
        let base = json!({"limit": 500, "auto": false});
        let overlay = json!({"limit": 100});
        let merged = merge_values(&base, &overlay);
        assert_eq!(merged, json!({"limit": 100, "auto": false}));
    }

    #[test]
    fn test_merge_nested_maps_merge_not_replace() {
        let base = json!({"find_options": {"conditions": {"a": 1}, "order": ["a"]}});
        let overlay = json!({"find_options": {"conditions": {"b": 2}}});
        let merged = merge_values(&base, &overlay);
        assert_eq!(
            merged,
            json!({"find_options": {"conditions": {"a": 1, "b": 2}, "order": ["a"]}})
        );
    }

    #[test]
    fn test_merge_scalar_replaces_map() {
        let base = json!({"x": {"deep": true}});
        let overlay = json!({"x": 7});
        assert_eq!(merge_values(&base, &overlay), json!({"x": 7}));
    }

    #[test]
    fn test_resolve_defaults() {
        let settings =
            resolve_settings("csv", &json!({}), &json!({})).expect("defaults resolve");
        assert!(!settings.auto);
        assert_eq!(settings.limit, Some(500));
        assert_eq!(settings.data_var_name, "data");
        assert_eq!(settings.char_encoding, TextEncoding::Utf16Le);
        assert_eq!(settings.file_name_format, "%controllerName%-%dateTime%");
        assert_eq!(settings.find_options, FindOptions::Inherit);
    }

    #[test]
    fn test_resolve_cascade_field_for_field() {
        let shared = json!({"limit": 200, "char_encoding": "UTF-8"});
        let format = json!({"limit": 50});
        let settings = resolve_settings("csv", &shared, &format).unwrap();
        // format layer wins for limit, shared layer survives for encoding
        assert_eq!(settings.limit, Some(50));
        assert_eq!(settings.char_encoding, TextEncoding::Utf8);
    }

    #[test]
    fn test_resolve_explicit_find_options() {
        let format = json!({"find_options": {"conditions": {"active": 1}, "limit": 25}});
        let settings = resolve_settings("csv", &json!({}), &format).unwrap();
        match settings.find_options {
            FindOptions::Explicit(map) => {
                assert_eq!(map.get("limit"), Some(&json!(25)));
            }
            FindOptions::Inherit => panic!("expected explicit options"),
        }
    }

    #[test]
    fn test_resolve_rejects_unknown_keys() {
        let err = resolve_settings("csv", &json!({}), &json!({"chunk": 10})).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedSettings { .. }));
    }

    #[test]
    fn test_find_options_inherit_round_trip() {
        let settings = resolve_settings("csv", &json!({"find_options": "inherit"}), &json!({}))
            .unwrap();
        assert_eq!(settings.find_options, FindOptions::Inherit);
    }
}
