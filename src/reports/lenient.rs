//! Forgiving field deserializers.
//!
//! Models drift from the requested shape in small ways: a score arrives as
//! `"7/10"`, a list of phrases arrives as a list of objects, a single item
//! arrives without its list. These helpers absorb that drift per field so
//! one odd field does not discard the whole report.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::output_parser::parse_score;

/// Object fields tried, in order, when a phrase arrives as an object.
const TEXT_FIELDS: [&str; 6] = ["text", "hook", "name", "title", "content", "description"];

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(ref map) => TEXT_FIELDS
            .iter()
            .find_map(|f| map.get(*f).and_then(|v| v.as_str()))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        Value::Array(_) => value.to_string(),
    }
}

/// Any scalar as a string; `null` as `""`.
pub(crate) fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(stringify(Value::deserialize(d)?))
}

/// A list of phrases. A bare string becomes a one-item list; empty items are dropped.
pub(crate) fn strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let items = match Value::deserialize(d)? {
        Value::Array(items) => items.into_iter().map(stringify).collect(),
        Value::Null => Vec::new(),
        other => vec![stringify(other)],
    };
    Ok(items.into_iter().filter(|s| !s.trim().is_empty()).collect())
}

/// A finite number, or a string holding one (`"7/10"`, `"Score: 6"`, `"85"`).
///
/// `NaN` and infinities become `0.0`; they would serialize as `null`.
pub(crate) fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_score(&s).ok().or_else(|| s.trim().parse().ok()),
        _ => None,
    };
    Ok(value.filter(|v: &f64| v.is_finite()).unwrap_or(0.0))
}

/// A flag, or a yes/no style string.
pub(crate) fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "tak"),
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    })
}
