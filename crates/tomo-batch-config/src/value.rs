use std::fmt;

use serde::Serialize;

/// Kind of value an option accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueKind {
    Bool,
    Integer,
    Float,
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueKind::Bool => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Text => "string",
        };
        f.write_str(label)
    }
}

/// A single configuration value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ConfigValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Bool(_) => ValueKind::Bool,
            ConfigValue::Integer(_) => ValueKind::Integer,
            ConfigValue::Float(_) => ValueKind::Float,
            ConfigValue::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(value) => Some(*value),
            ConfigValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Parse a command-line string as `kind`.
    pub fn parse_as(kind: ValueKind, raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        match kind {
            ValueKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(ConfigValue::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(ConfigValue::Bool(false)),
                _ => Err(format!("expected a boolean, found '{raw}'")),
            },
            ValueKind::Integer => trimmed
                .parse::<i64>()
                .map(ConfigValue::Integer)
                .map_err(|_| format!("expected an integer, found '{raw}'")),
            ValueKind::Float => trimmed
                .parse::<f64>()
                .map(ConfigValue::Float)
                .map_err(|_| format!("expected a number, found '{raw}'")),
            ValueKind::Text => Ok(ConfigValue::Text(raw.to_owned())),
        }
    }

    /// Best-effort parse for keys the registry does not know about.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<bool>() {
            return ConfigValue::Bool(value);
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return ConfigValue::Integer(value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            return ConfigValue::Float(value);
        }
        ConfigValue::Text(raw.to_owned())
    }

    /// Coerce into `kind`, widening integers to floats. Returns `None` on mismatch.
    pub(crate) fn coerce(self, kind: ValueKind) -> Option<Self> {
        match (self, kind) {
            (ConfigValue::Integer(value), ValueKind::Float) => Some(ConfigValue::Float(value as f64)),
            (value, kind) if value.kind() == kind => Some(value),
            _ => None,
        }
    }

    pub(crate) fn to_toml(&self) -> toml::Value {
        match self {
            ConfigValue::Bool(value) => toml::Value::Boolean(*value),
            ConfigValue::Integer(value) => toml::Value::Integer(*value),
            ConfigValue::Float(value) => toml::Value::Float(*value),
            ConfigValue::Text(value) => toml::Value::String(value.clone()),
        }
    }

    pub(crate) fn from_toml(value: toml::Value) -> Option<Self> {
        match value {
            toml::Value::Boolean(value) => Some(ConfigValue::Bool(value)),
            toml::Value::Integer(value) => Some(ConfigValue::Integer(value)),
            toml::Value::Float(value) => Some(ConfigValue::Float(value)),
            toml::Value::String(value) => Some(ConfigValue::Text(value)),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(value) => write!(f, "{value}"),
            ConfigValue::Integer(value) => write!(f, "{value}"),
            ConfigValue::Float(value) => write!(f, "{value}"),
            ConfigValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Text(value.to_owned())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Text(value)
    }
}
