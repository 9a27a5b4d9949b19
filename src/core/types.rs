use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Dense per-segment document number. Ids start at 1; 0 means "not a doc".
pub type DocId = u32;

/// Field value as supplied by the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Bytes(Vec<u8>),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::I64(v)
    }
}

/// A mapping from field name to field value. Documents have no identity
/// until indexed; the writer assigns a doc id at flush time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub fields: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new() -> Self {
        Document {
            fields: BTreeMap::new(),
        }
    }

    pub fn add_field(&mut self, name: &str, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_access() {
        let mut doc = Document::new();
        doc.add_field("title", "Lorem ipsum");
        doc.add_field("year", 2024i64);

        assert_eq!(
            doc.get_field("title").and_then(|v| v.as_text()),
            Some("Lorem ipsum")
        );
        assert_eq!(doc.get_field("year"), Some(&FieldValue::I64(2024)));
        assert!(doc.get_field("body").is_none());
    }
}
