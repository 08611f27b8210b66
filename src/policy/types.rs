use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const STYLE_TONE: &str = "tone";
pub const STYLE_MAX_WORDS: &str = "max_words_default";

/// A single style setting: either free text or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StyleValue {
    Integer(i64),
    Text(String),
}

impl StyleValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Integer(_) => None,
        }
    }
}

impl TryFrom<Value> for StyleValue {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    return Ok(Self::Integer(int));
                }
                match number.as_f64() {
                    #[allow(clippy::cast_possible_truncation)]
                    Some(float) if float.fract() == 0.0 && float.abs() < 9.0e15 => {
                        Ok(Self::Integer(float as i64))
                    }
                    _ => Err(format!("style value {number} is not an integer")),
                }
            }
            other => Err(format!(
                "style value must be a string or integer, got {other}"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for StyleValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl From<&str> for StyleValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for StyleValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl fmt::Display for StyleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Style keys mapped to values, merged key by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Style(BTreeMap<String, StyleValue>);

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<StyleValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&StyleValue> {
        self.0.get(key)
    }

    pub fn tone(&self) -> Option<&str> {
        self.get(STYLE_TONE).and_then(StyleValue::as_text)
    }

    pub fn max_words_default(&self) -> Option<i64> {
        self.get(STYLE_MAX_WORDS).and_then(StyleValue::as_integer)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StyleValue)> {
        self.0.iter()
    }

    /// Shallow overlay: keys from `other` overwrite or extend this style.
    pub fn overlay(&self, other: &Style) -> Style {
        let mut merged = self.0.clone();
        for (key, value) in &other.0 {
            merged.insert(key.clone(), value.clone());
        }
        Style(merged)
    }
}

/// The rulebook a generation step follows. Never mutated once built; every
/// patch produces a new value through [`super::apply_patch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub version: u32,
    pub rules: Vec<String>,
    pub style: Style,
    pub checklist: Vec<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            version: 1,
            rules: vec![
                "Before answering, list constraints and tick them off.".into(),
                "Do not request sensitive payment data beyond last 4 digits.".into(),
            ],
            style: Style::new()
                .with(STYLE_TONE, "calm, confident")
                .with(STYLE_MAX_WORDS, 120),
            checklist: vec![
                "Constraint coverage complete".into(),
                "Word limit respected".into(),
                "No sensitive data requested".into(),
                "No admission of fault when prohibited".into(),
            ],
        }
    }
}

/// A proposed delta to a [`Policy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(default, deserialize_with = "null_as_default")]
    pub new_rules: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub remove_rules: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub update_style: Style,
    #[serde(default, deserialize_with = "null_as_default")]
    pub update_checklist: Vec<String>,
    pub rationale: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Patch {
    /// Parse and validate a patch from an untyped JSON value.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Whether applying this patch would change anything besides the version.
    pub fn is_noop(&self) -> bool {
        self.new_rules.is_empty()
            && self.remove_rules.is_empty()
            && self.update_style.is_empty()
            && self.update_checklist.is_empty()
    }
}
