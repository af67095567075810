use serde_json::Value;
use thiserror::Error;

use crate::models::{normalize_string, ProviderInput, ProviderRecord};

#[derive(Debug, Error, PartialEq)]
pub enum ImportError {
    #[error("file is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("expected a JSON array of providers")]
    NotAnArray,
    #[error("entry {index} is not an object")]
    NotAnObject { index: usize },
    #[error("entry {index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },
}

/// Validates an exported provider list. Every entry must be an object carrying string
/// `name`, `url` and `apiKey`; any failure rejects the whole file.
pub fn parse_import(contents: &str) -> Result<Vec<ProviderInput>, ImportError> {
    let value = serde_json::from_str::<Value>(contents)
        .map_err(|err| ImportError::InvalidJson(err.to_string()))?;
    let items = value.as_array().ok_or(ImportError::NotAnArray)?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_entry(index, item))
        .collect()
}

fn parse_entry(index: usize, item: &Value) -> Result<ProviderInput, ImportError> {
    let object = item.as_object().ok_or(ImportError::NotAnObject { index })?;
    let required = |field: &'static str| {
        object
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(ImportError::MissingField { index, field })
    };

    Ok(ProviderInput {
        name: required("name")?,
        url: required("url")?,
        api_key: required("apiKey")?,
        user_id: object.get("userId").map(loose_string).unwrap_or_default(),
        unit: object
            .get("unit")
            .and_then(Value::as_str)
            .and_then(normalize_string),
    })
}

/// User ids show up as numbers in some exports.
fn loose_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    }
}

/// Serializes providers as the bare array used for import/export.
pub fn export_providers(providers: &[ProviderRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(providers)
}
