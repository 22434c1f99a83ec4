use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ValidationError;

/// The typed value a Setting row carries, mirroring the coercion rules the
/// config layer applies when it reads a row back out of the store (bool,
/// float, int, comma/JSON string list, or plain string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    StringList(Vec<String>),
    Str(String),
}

impl SettingValue {
    pub fn type_tag(&self) -> &'static str {
        match self {
            SettingValue::Bool(_) => "bool",
            SettingValue::Int(_) => "int",
            SettingValue::Float(_) => "float",
            SettingValue::StringList(_) => "string_list",
            SettingValue::Str(_) => "string",
        }
    }

    /// Parses a raw DB string using the stored value_type tag (accepts JSON
    /// arrays or comma-separated lists for string_list, falls back to the
    /// raw string on any parse failure).
    pub fn parse(value_type: &str, raw: &str) -> SettingValue {
        match value_type {
            "bool" => SettingValue::Bool(!matches!(raw.to_lowercase().as_str(), "false" | "0" | "no" | "")),
            "int" => raw
                .parse::<i64>()
                .map(SettingValue::Int)
                .unwrap_or_else(|_| SettingValue::Str(raw.to_string())),
            "float" => raw
                .parse::<f64>()
                .map(SettingValue::Float)
                .unwrap_or_else(|_| SettingValue::Str(raw.to_string())),
            "string_list" => {
                if raw.trim_start().starts_with('[') {
                    serde_json::from_str::<Vec<String>>(raw)
                        .map(SettingValue::StringList)
                        .unwrap_or_else(|_| SettingValue::Str(raw.to_string()))
                } else {
                    SettingValue::StringList(
                        raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
                    )
                }
            }
            _ => SettingValue::Str(raw.to_string()),
        }
    }

    pub fn to_raw(&self) -> String {
        match self {
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::Int(i) => i.to_string(),
            SettingValue::Float(f) => f.to_string(),
            SettingValue::StringList(list) => serde_json::to_string(list).unwrap_or_default(),
            SettingValue::Str(s) => s.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Float(f) => Some(*f),
            SettingValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str_list(&self) -> Option<&[String]> {
        match self {
            SettingValue::StringList(list) => Some(list),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Setting {
    key: String,
    value: SettingValue,
    description: Option<String>,
    updated_at: DateTime<Utc>,
}

impl Setting {
    pub fn new(key: String, value: SettingValue, updated_at: DateTime<Utc>) -> Result<Self, ValidationError> {
        if key.is_empty() {
            return Err(ValidationError::NameIsEmptyString);
        }

        Ok(Self { key, value, description: None, updated_at })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &SettingValue {
        &self.value
    }

    pub fn set_value(&mut self, value: SettingValue, updated_at: DateTime<Utc>) {
        self.value = value;
        self.updated_at = updated_at;
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
