//! Argument coercion shared by tool implementations
//!
//! Query-string arguments arrive as strings, body arguments as typed JSON;
//! these helpers accept either.

use serde_json::{Map, Value};

use crate::errors::AppError;

pub fn object_arguments(arguments: &Value) -> Result<&Map<String, Value>, AppError> {
    arguments
        .as_object()
        .ok_or_else(|| AppError::invalid_arguments("arguments must be a JSON object"))
}

pub fn number_argument(arguments: &Value, name: &str) -> Result<f64, AppError> {
    let value = object_arguments(arguments)?
        .get(name)
        .ok_or_else(|| AppError::invalid_arguments(format!("'{name}' is required")))?;

    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|number| number.is_finite())
        .ok_or_else(|| AppError::invalid_arguments(format!("'{name}' must be a number")))
}

pub fn optional_string_argument(arguments: &Value, name: &str) -> Result<Option<String>, AppError> {
    match object_arguments(arguments)?.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(Value::Bool(flag)) => Ok(Some(flag.to_string())),
        Some(_) => Err(AppError::invalid_arguments(format!(
            "'{name}' must be a string"
        ))),
    }
}

/// Integral floats come back as JSON integers so `1 + 2` reads as `3`, not `3.0`.
pub fn number_to_json(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}
