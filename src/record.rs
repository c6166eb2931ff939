use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Scalar stored in one record column.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

/// One fixture as a flat, ordered column -> value mapping.
///
/// The key set is fixed by the schema the record was created with; a missing
/// value is `FieldValue::Null`, never a missing key.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    fields: Vec<(&'static str, FieldValue)>,
}

impl MatchRecord {
    pub fn with_schema(schema: &[&'static str]) -> Self {
        Self {
            fields: schema.iter().map(|key| (*key, FieldValue::Null)).collect(),
        }
    }

    /// Sets `key` if the schema declares it. Returns false for unknown keys.
    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>) -> bool {
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    /// Copy of this record keyed by `schema`; shared keys keep their values,
    /// keys this record lacks are null.
    pub fn conform(&self, schema: &[&'static str]) -> MatchRecord {
        let mut out = MatchRecord::with_schema(schema);
        for (key, value) in &self.fields {
            out.set(key, value.clone());
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(k, _)| *k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for MatchRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
