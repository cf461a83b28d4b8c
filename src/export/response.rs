use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{ConfigError, ConfigResult};
use crate::export::fields::render_value;
use crate::export::types::TextEncoding;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([A-Za-z]+)%").expect("placeholder pattern is valid"));

static FILE_NAME_SANITIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9-]+").expect("sanitize pattern is valid"));

/// The response metadata for one download, finalized before the first chunk
/// is streamed and sent exactly once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadHeaders {
    pub file_name: String,
    pub content_type: String,
    pub content_disposition: String,
    pub cache_control: String,
    pub pragma: String,
    pub expires: String,
    pub content_transfer_encoding: String,
}

impl DownloadHeaders {
    /// Header name/value pairs in transmission form.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("Content-Type", self.content_type.as_str()),
            ("Content-Disposition", self.content_disposition.as_str()),
            ("Cache-Control", self.cache_control.as_str()),
            ("Pragma", self.pragma.as_str()),
            ("Expires", self.expires.as_str()),
            (
                "Content-Transfer-Encoding",
                self.content_transfer_encoding.as_str(),
            ),
        ]
    }
}

/// Build the headers for one run.
///
/// The timestamp is a parameter so that generation is deterministic for a
/// given instant; idempotent for identical inputs.
pub fn build_download_headers(
    template: &str,
    primary_model: &str,
    conditions: &Map<String, Value>,
    extension: &str,
    content_type: &mime::Mime,
    encoding: TextEncoding,
    now: DateTime<Utc>,
) -> ConfigResult<DownloadHeaders> {
    let file_name = build_file_name(template, primary_model, conditions, extension, now)?;

    Ok(DownloadHeaders {
        content_type: format!("{}; charset={}", content_type, encoding.charset()),
        content_disposition: format!("attachment; filename=\"{}\"", file_name),
        cache_control: "private, no-cache, no-store, must-revalidate".to_string(),
        pragma: "no-cache".to_string(),
        expires: "0".to_string(),
        content_transfer_encoding: "binary".to_string(),
        file_name,
    })
}

/// Substitute template placeholders and sanitize the result into an
/// attachment file name.
pub fn build_file_name(
    template: &str,
    primary_model: &str,
    conditions: &Map<String, Value>,
    extension: &str,
    now: DateTime<Utc>,
) -> ConfigResult<String> {
    let mut name = template.to_string();

    for capture in PLACEHOLDER_RE.captures_iter(template) {
        let placeholder = &capture[1];
        let replacement = match placeholder {
            "controllerName" => underscore(primary_model),
            "conditions" => render_conditions(conditions),
            "dateTime" => now.format("%Y-%m-%d-%H-%M-%S").to_string(),
            unknown => return Err(ConfigError::UnknownPlaceholder(unknown.to_string())),
        };
        name = name.replace(&format!("%{}%", placeholder), &replacement);
    }

    let lowered = name.to_lowercase();
    let sanitized = FILE_NAME_SANITIZE_RE
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string();

    Ok(format!("{}.{}", sanitized, extension.to_lowercase()))
}

/// `EmailSignups` becomes `email_signups`.
fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (index, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if index > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Best-effort readable rendering of the conditions map. Deterministic for
/// a given map; not guaranteed unique or fully faithful for nested
/// conditions.
fn render_conditions(conditions: &Map<String, Value>) -> String {
    conditions
        .iter()
        .map(|(key, value)| format!("{} {}", key, render_value(value)))
        .collect::<Vec<_>>()
        .join(" ")
}
