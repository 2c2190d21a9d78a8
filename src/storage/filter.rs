//! Query filters
//!
//! A filter is a conjunction of per-field terms. A term is either exact equality
//! on the cell text or an unanchored regular-expression search. There are no
//! ranges, no `$or` and no nested paths; asking for one is an error rather than
//! a silently ignored term.

use crate::core::{Document, Error, FieldValue, Result, ID_FIELD};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Condition on a single field
#[derive(Debug, Clone)]
pub enum Condition {
    /// Cell text equals the value's cell rendering (case-sensitive)
    Equals(FieldValue),
    /// Cell text contains a match for the expression
    Pattern {
        /// Compiled expression
        regex: Regex,
        /// Whether the expression was compiled case-insensitively
        case_insensitive: bool,
    },
}

impl Condition {
    fn matches(&self, cell: &str) -> bool {
        match self {
            Condition::Equals(value) => value.to_cell() == cell,
            Condition::Pattern { regex, .. } => regex.is_match(cell),
        }
    }
}

/// Conjunction of field conditions; the empty filter matches everything
#[derive(Debug, Clone, Default)]
pub struct Filter {
    terms: Vec<(String, Condition)>,
}

impl Filter {
    /// Filter matching every document
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter on `_id` equality
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::all().eq(ID_FIELD, FieldValue::String(id.into()))
    }

    /// Add an equality term
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.terms.push((field.into(), Condition::Equals(value.into())));
        self
    }

    /// Add a pattern term
    pub fn pattern(
        mut self,
        field: impl Into<String>,
        pattern: &str,
        case_insensitive: bool,
    ) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| Error::invalid_input(format!("invalid pattern '{}': {}", pattern, e)))?;
        self.terms.push((
            field.into(),
            Condition::Pattern {
                regex,
                case_insensitive,
            },
        ));
        Ok(self)
    }

    /// Parse a JSON filter object.
    ///
    /// Accepted term shapes:
    /// - `{"field": scalar}` for equality
    /// - `{"field": {"pattern": "ali", "caseInsensitive": true}}`
    /// - `{"field": {"$regex": "ali", "$options": "i"}}`
    ///
    /// A pattern without a case flag matches case-insensitively.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let object = match value {
            JsonValue::Null => return Ok(Self::all()),
            JsonValue::Object(object) => object,
            other => {
                return Err(Error::unsupported_filter(format!(
                    "filter must be an object, got {}",
                    other
                )))
            }
        };

        let mut filter = Self::all();
        for (field, term) in object {
            check_field_name(field)?;
            filter = match term {
                JsonValue::Object(matcher) => parse_matcher(filter, field, matcher)?,
                JsonValue::Array(_) => {
                    return Err(Error::unsupported_filter(format!(
                        "array value for '{}' (set membership is not supported)",
                        field
                    )))
                }
                scalar => filter.eq(field.as_str(), FieldValue::from_json(scalar.clone())),
            };
        }
        Ok(filter)
    }

    /// Equality filter from name/value pairs such as URL query parameters.
    /// Field names are checked the same way as in [`Filter::from_json`].
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        pairs.into_iter().try_fold(Self::all(), |filter, (field, value)| {
            let field = field.into();
            check_field_name(&field)?;
            Ok(filter.eq(field, value))
        })
    }

    /// Whether every term matches. Missing fields match as the empty string.
    pub fn matches(&self, document: &Document) -> bool {
        self.terms.iter().all(|(field, condition)| {
            let cell = document.get(field).map(FieldValue::to_cell).unwrap_or_default();
            condition.matches(&cell)
        })
    }

    /// Whether the filter has no terms
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }
}

fn check_field_name(field: &str) -> Result<()> {
    if field.starts_with('$') {
        return Err(Error::unsupported_filter(format!("operator '{}'", field)));
    }
    if field.contains('.') {
        return Err(Error::unsupported_filter(format!("nested path '{}'", field)));
    }
    Ok(())
}

fn parse_matcher(filter: Filter, field: &str, matcher: &Map<String, JsonValue>) -> Result<Filter> {
    if let Some(pattern) = matcher.get("pattern") {
        reject_unknown_keys(field, matcher, &["pattern", "caseInsensitive"])?;
        let pattern = expect_str(field, "pattern", pattern)?;
        let case_insensitive = match matcher.get("caseInsensitive") {
            None | Some(JsonValue::Null) => true,
            Some(JsonValue::Bool(flag)) => *flag,
            Some(other) => {
                return Err(Error::unsupported_filter(format!(
                    "caseInsensitive for '{}' must be a boolean, got {}",
                    field, other
                )))
            }
        };
        return filter.pattern(field, pattern, case_insensitive);
    }

    if let Some(pattern) = matcher.get("$regex") {
        reject_unknown_keys(field, matcher, &["$regex", "$options"])?;
        let pattern = expect_str(field, "$regex", pattern)?;
        let options = match matcher.get("$options") {
            None | Some(JsonValue::Null) => "",
            Some(options) => expect_str(field, "$options", options)?,
        };
        if let Some(flag) = options.chars().find(|c| *c != 'i') {
            return Err(Error::unsupported_filter(format!(
                "regex option '{}' for '{}'",
                flag, field
            )));
        }
        // An absent or empty option string means case-insensitive
        let case_insensitive = options.is_empty() || options.contains('i');
        return filter.pattern(field, pattern, case_insensitive);
    }

    let operators: Vec<&str> = matcher.keys().map(String::as_str).collect();
    Err(Error::unsupported_filter(format!(
        "operators {:?} for '{}'",
        operators, field
    )))
}

fn reject_unknown_keys(field: &str, matcher: &Map<String, JsonValue>, allowed: &[&str]) -> Result<()> {
    match matcher.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(Error::unsupported_filter(format!(
            "operator '{}' for '{}'",
            key, field
        ))),
        None => Ok(()),
    }
}

fn expect_str<'a>(field: &str, key: &str, value: &'a JsonValue) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        Error::unsupported_filter(format!("{} for '{}' must be a string", key, field))
    })
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (field, condition)) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match condition {
                Condition::Equals(value) => write!(f, "{}={:?}", field, value.to_cell())?,
                Condition::Pattern {
                    regex,
                    case_insensitive,
                } => write!(
                    f,
                    "{}~/{}/{}",
                    field,
                    regex.as_str(),
                    if *case_insensitive { "i" } else { "" }
                )?,
            }
        }
        f.write_str("}")
    }
}
