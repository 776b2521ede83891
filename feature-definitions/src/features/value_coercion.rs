use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::features::feature_models::ValueType;

#[derive(Error, Debug)]
pub enum CoercionError {
    #[error("invalid json value: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("no coercion for unknown value type")]
    UnknownValueType,
}

// Longest leading decimal literal, so "12px" reads as 12
static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").expect("number pattern is valid")
});

type Coercer = fn(&str) -> Result<Value, CoercionError>;

/// Single lookup from a value type to its coercion function.
/// Adding a value type means adding a variant and one arm here.
fn coercer(value_type: ValueType) -> Coercer {
    match value_type {
        ValueType::Boolean => coerce_boolean,
        ValueType::Number => coerce_number,
        ValueType::String => coerce_string,
        ValueType::Json => coerce_json,
        ValueType::Unknown => |_| Err(CoercionError::UnknownValueType),
    }
}

/// What the stored value would be if it were well formed.
pub fn parse_value(value_type: ValueType, raw: &str) -> Result<Value, CoercionError> {
    coercer(value_type)(raw)
}

/// Fallback used when a stored value can't be parsed as its declared type.
pub fn fallback_value(value_type: ValueType) -> Value {
    match value_type {
        ValueType::Number => Value::Number(Number::from(0)),
        _ => Value::Null,
    }
}

/// Converts a stored raw string into the runtime value for its declared type.
/// Malformed input never fails here, it collapses to [`fallback_value`].
pub fn coerce(value_type: ValueType, raw: &str) -> Value {
    parse_value(value_type, raw).unwrap_or_else(|e| {
        tracing::debug!(?value_type, error = %e, "falling back for malformed stored value");
        fallback_value(value_type)
    })
}

// Only the exact string "false" is falsy. "", "0" and "no" are all true.
fn coerce_boolean(raw: &str) -> Result<Value, CoercionError> {
    Ok(Value::Bool(raw != "false"))
}

fn coerce_number(raw: &str) -> Result<Value, CoercionError> {
    let parsed = parse_float(raw).ok_or_else(|| CoercionError::InvalidNumber(raw.to_string()))?;
    Number::from_f64(parsed)
        .map(number_value)
        .ok_or_else(|| CoercionError::InvalidNumber(raw.to_string()))
}

fn coerce_string(raw: &str) -> Result<Value, CoercionError> {
    Ok(Value::String(raw.to_string()))
}

fn coerce_json(raw: &str) -> Result<Value, CoercionError> {
    Ok(serde_json::from_str(raw)?)
}

/// Parses a float leniently, the way stored numeric strings are written by clients.
/// Leading whitespace is skipped and trailing junk after the number is ignored.
/// Returns None when there is no leading number or it isn't finite.
pub fn parse_float(raw: &str) -> Option<f64> {
    let number = LEADING_NUMBER.find(raw.trim_start())?;
    number.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}

// Whole numbers are emitted as integers so `"3"` becomes `3` rather than `3.0`.
fn number_value(number: Number) -> Value {
    match number.as_f64() {
        Some(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
            Value::Number(Number::from(v as i64))
        }
        _ => Value::Number(number),
    }
}
