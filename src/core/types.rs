//! Core type definitions: field values and documents
//!
//! A [`Document`] is an insertion-ordered map of field name to [`FieldValue`].
//! Field order matters: it decides the order in which new columns are appended
//! to a collection's header row.
//!
//! The grid underneath stores nothing but strings. [`FieldValue::to_cell`] is
//! the single place where typed values are rendered into cells; on the way back
//! every cell is read as a string and the typed getters on [`Document`] parse it.

use crate::core::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Primary key field, generated at insert time when absent
pub const ID_FIELD: &str = "_id";
/// Creation timestamp field, written once at insert
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Modification timestamp field, rewritten by every update
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Scalar value stored in a document field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Text
    String(String),
    /// 64-bit floating point number
    Number(f64),
    /// Boolean value
    Bool(bool),
    /// Explicit absence; renders as an empty cell
    Null,
}

impl FieldValue {
    /// Render the value as a transport cell
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::String(s) => s.clone(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Null => String::new(),
        }
    }

    /// Read a transport cell. Cells carry no type tag, so this is always a string.
    pub fn from_cell(cell: &str) -> Self {
        FieldValue::String(cell.to_string())
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Get value as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get value as float, parsing the string form when needed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get value as integer, parsing the string form when needed
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            FieldValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get value as boolean; accepts the `"true"`/`"false"` cell forms
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            FieldValue::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    /// Convert from JSON. Arrays and objects are kept as their compact JSON text.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(b) => FieldValue::Bool(b),
            JsonValue::Number(n) => n
                .as_f64()
                .map(FieldValue::Number)
                .unwrap_or_else(|| FieldValue::String(n.to_string())),
            JsonValue::String(s) => FieldValue::String(s),
            nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
                FieldValue::String(nested.to_string())
            }
        }
    }

    /// Convert to JSON
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::String(s) => JsonValue::String(s.clone()),
            FieldValue::Number(n) if is_integral(*n) => JsonValue::from(*n as i64),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            FieldValue::Bool(b) => JsonValue::Bool(*b),
            FieldValue::Null => JsonValue::Null,
        }
    }
}

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15
}

fn format_number(n: f64) -> String {
    if is_integral(n) {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cell())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        JsonValue::deserialize(deserializer).map(FieldValue::from_json)
    }
}

/// A schema-flexible record: field name to scalar value, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: IndexMap<String, FieldValue>,
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from a JSON object
    pub fn from_json(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, FieldValue::from_json(v)))
                .collect()),
            other => Err(Error::invalid_input(format!(
                "document must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Render as a JSON object
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Field value by name
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Set a field, keeping its original position if it already existed
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Remove a field, preserving the order of the rest
    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.shift_remove(field)
    }

    /// Whether the field is present
    pub fn contains_key(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Field names in first-seen order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterate over fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Shallow merge: every field of `update` overwrites or extends `self`
    pub fn merge(&mut self, update: &Document) {
        for (field, value) in update.iter() {
            self.insert(field, value.clone());
        }
    }

    /// The document's `_id`, if set and non-empty
    pub fn id(&self) -> Option<&str> {
        self.get_str(ID_FIELD).filter(|id| !id.is_empty())
    }

    /// `createdAt` stamp
    pub fn created_at(&self) -> Option<&str> {
        self.get_str(CREATED_AT_FIELD)
    }

    /// `updatedAt` stamp
    pub fn updated_at(&self) -> Option<&str> {
        self.get_str(UPDATED_AT_FIELD)
    }

    /// String field
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    /// Integer field, parsed from its cell form if necessary
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_i64)
    }

    /// Float field, parsed from its cell form if necessary
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_f64)
    }

    /// Boolean field, parsed from its cell form if necessary
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(FieldValue::as_bool)
    }
}

impl<K, V> FromIterator<(K, V)> for Document
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, FieldValue);
    type IntoIter = indexmap::map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
