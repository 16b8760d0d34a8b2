//! Tolerant numeric input parsing
//!
//! Users answer prompts with free text such as `3`, `3.5`, `3,5`, `3кр`,
//! `95%` or `3 кредит`. The first numeric token wins; a leading minus sign is
//! kept so negative values reach range validation instead of being misread.

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[-+]?(?:[0-9]+(?:[.,][0-9]+)?|[.,][0-9]+)").expect("number pattern is valid")
});

/// Which prompt an input answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputField {
    Count,
    Credit,
    Score,
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputField::Count => "course count",
            InputField::Credit => "credit",
            InputField::Score => "score",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("Input is empty")]
    Empty,
    #[error("No number found in {0:?}")]
    NoNumber(String),
    #[error("Expected a number or text, got {0}")]
    UnsupportedType(&'static str),
}

/// Extract the first number from free text
pub fn parse_number(raw: &str) -> Result<f64, InputError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(InputError::Empty);
    }

    let token = NUMBER_RE
        .find(text)
        .ok_or_else(|| InputError::NoNumber(text.to_string()))?;

    token
        .as_str()
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| InputError::NoNumber(text.to_string()))
}

/// Accept either a JSON number or a text token
pub fn parse_value(value: &Value) -> Result<f64, InputError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or(InputError::UnsupportedType("number")),
        Value::String(s) => parse_number(s),
        Value::Null => Err(InputError::Empty),
        Value::Bool(_) => Err(InputError::UnsupportedType("boolean")),
        Value::Array(_) => Err(InputError::UnsupportedType("array")),
        Value::Object(_) => Err(InputError::UnsupportedType("object")),
    }
}
