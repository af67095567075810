use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BackendError, Result};

pub const DEFAULT_UNIT: &str = "USD";

const CURRENCY_SYMBOLS: [(&str, &str); 5] = [
    ("USD", "$"),
    ("CNY", "¥"),
    ("EUR", "€"),
    ("GBP", "£"),
    ("JPY", "¥"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    pub api_key: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "default_unit")]
    pub unit: String,
}

/// A provider record without its id, as submitted by the settings form or an import file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInput {
    pub name: String,
    pub url: String,
    pub api_key: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub unit: Option<String>,
}

impl ProviderInput {
    /// Form-level checks only. Nothing here talks to the remote provider.
    pub fn validate_form(&self) -> Result<()> {
        if normalize_string(&self.name).is_none() {
            return Err(BackendError::Validation("name is required".to_string()));
        }
        if normalize_string(&self.api_key).is_none() {
            return Err(BackendError::Validation("apiKey is required".to_string()));
        }
        Url::parse(self.url.trim())
            .map_err(|err| BackendError::Validation(format!("url is not a valid URL: {err}")))?;
        Ok(())
    }

    pub fn resolved_unit(&self) -> String {
        normalize_optional_string(self.unit.clone()).unwrap_or_else(default_unit)
    }
}

impl ProviderRecord {
    pub fn has_quota_credentials(&self) -> bool {
        !self.url.trim().is_empty()
            && !self.api_key.trim().is_empty()
            && !self.user_id.trim().is_empty()
    }
}

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

pub fn currency_symbol(unit: &str) -> &str {
    match CURRENCY_SYMBOLS.iter().find(|(code, _)| *code == unit) {
        Some((_, symbol)) => *symbol,
        None => unit,
    }
}

pub fn normalize_optional_string(input: Option<String>) -> Option<String> {
    input.and_then(|value| normalize_string(&value))
}

pub fn normalize_string(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, url: &str, api_key: &str) -> ProviderInput {
        ProviderInput {
            name: name.to_string(),
            url: url.to_string(),
            api_key: api_key.to_string(),
            user_id: String::new(),
            unit: None,
        }
    }

    #[test]
    fn currency_symbol_falls_back_to_code() {
        assert_eq!(currency_symbol("USD"), "$");
        assert_eq!(currency_symbol("EUR"), "€");
        assert_eq!(currency_symbol("CHF"), "CHF");
    }

    #[test]
    fn validate_form_requires_name_key_and_url() {
        assert!(input("One", "https://one.test", "sk-1").validate_form().is_ok());

        let err = input("  ", "https://one.test", "sk-1")
            .validate_form()
            .expect_err("blank name should fail");
        assert!(err.to_string().contains("name is required"));

        let err = input("One", "not a url", "sk-1")
            .validate_form()
            .expect_err("bad url should fail");
        assert!(err.to_string().contains("url is not a valid URL"));

        assert!(input("One", "https://one.test", "").validate_form().is_err());
    }

    #[test]
    fn resolved_unit_defaults_blank_to_usd() {
        let mut provider = input("One", "https://one.test", "sk-1");
        assert_eq!(provider.resolved_unit(), "USD");
        provider.unit = Some(" ".to_string());
        assert_eq!(provider.resolved_unit(), "USD");
        provider.unit = Some("CNY".to_string());
        assert_eq!(provider.resolved_unit(), "CNY");
    }

    #[test]
    fn record_without_unit_deserializes_with_default() {
        let record: ProviderRecord = serde_json::from_str(
            r#"{"id":"a","name":"A","url":"https://a.test","apiKey":"k"}"#,
        )
        .expect("record should parse");
        assert_eq!(record.unit, "USD");
        assert_eq!(record.user_id, "");
        assert!(!record.has_quota_credentials());
    }
}
