use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::analysis::Analyzer;
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::similarity::Similarity;
use crate::plan::field_type::FieldType;

const SCHEMA_FORMAT: i64 = 1;

/// Ordered set of field specifications. A schema freezes once a segment
/// has been written against it; new fields may still be introduced at the
/// index level before the next writer opens.
pub struct Schema {
    fields: Vec<(String, FieldType)>,
    by_name: HashMap<String, usize>,
    analyzers: HashMap<String, Arc<dyn Analyzer>>,
    similarity: Arc<Similarity>,
    frozen: bool,
}

impl Schema {
    pub fn new() -> Self {
        Schema {
            fields: Vec::new(),
            by_name: HashMap::new(),
            analyzers: HashMap::new(),
            similarity: Arc::new(Similarity::new()),
            frozen: false,
        }
    }

    /// Register a field. Re-registering with an identical spec is a no-op;
    /// a conflicting spec or a new field on a frozen schema is an error.
    pub fn spec_field(&mut self, name: &str, field_type: FieldType) -> Result<()> {
        if let Some(&idx) = self.by_name.get(name) {
            if self.fields[idx].1 == field_type {
                return Ok(());
            }
            return Err(Error::new(
                ErrorKind::InvalidSchema,
                format!("Can't redefine field '{}'", name),
            ));
        }
        if self.frozen {
            return Err(Error::new(
                ErrorKind::InvalidSchema,
                format!("Can't add field '{}' to a frozen schema", name),
            ));
        }
        if let Some(spec) = field_type.analyzer_spec() {
            self.analyzers.insert(name.to_string(), spec.build()?);
        }
        self.by_name.insert(name.to_string(), self.fields.len());
        self.fields.push((name.to_string(), field_type));
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn fetch_type(&self, name: &str) -> Option<&FieldType> {
        self.by_name.get(name).map(|&idx| &self.fields[idx].1)
    }

    pub fn fetch_analyzer(&self, name: &str) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(name).cloned()
    }

    pub fn similarity(&self) -> Arc<Similarity> {
        Arc::clone(&self.similarity)
    }

    /// Indexed text fields, in registration order; the query parser's
    /// default search set.
    pub fn default_search_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, ftype)| {
                ftype.is_indexed() && ftype.analyzer_spec().is_some()
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn dump(&self) -> Result<Value> {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .map(|(name, ftype)| {
                serde_json::to_value(ftype)
                    .map(|spec| json!({"name": name, "spec": spec}))
                    .map_err(Error::from)
            })
            .collect::<Result<_>>()?;
        Ok(json!({"fields": fields, "format": SCHEMA_FORMAT}))
    }

    pub fn load(dump: &Value) -> Result<Schema> {
        let format = dump.get("format").and_then(Value::as_i64).unwrap_or(0);
        if format > SCHEMA_FORMAT {
            return Err(Error::new(
                ErrorKind::UnsupportedFormat,
                format!("Unsupported schema format: {}", format),
            ));
        }
        let fields = dump
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::corrupt("Schema dump missing 'fields'"))?;

        let mut schema = Schema::new();
        for entry in fields {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::corrupt("Schema field missing 'name'"))?;
            let spec = entry
                .get("spec")
                .ok_or_else(|| Error::corrupt("Schema field missing 'spec'"))?;
            let field_type: FieldType = serde_json::from_value(spec.clone())
                .map_err(|e| Error::corrupt(format!("Bad spec for field '{}': {}", name, e)))?;
            schema.spec_field(name, field_type)?;
        }
        Ok(schema)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Schema::new()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("fields", &self.fields)
            .field("frozen", &self.frozen)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schema() -> Schema {
        let mut schema = Schema::new();
        schema.spec_field("title", FieldType::plain_text()).unwrap();
        schema
            .spec_field("content", FieldType::full_text("en"))
            .unwrap();
        schema.spec_field("raw", FieldType::blob()).unwrap();
        schema
    }

    #[test]
    fn fields_keep_registration_order() {
        let schema = test_schema();
        let names: Vec<&str> = schema.field_names().collect();
        assert_eq!(names, vec!["title", "content", "raw"]);
        assert_eq!(schema.default_search_fields(), vec!["title", "content"]);
    }

    #[test]
    fn identical_re_registration_is_a_no_op() {
        let mut schema = test_schema();
        schema.spec_field("title", FieldType::plain_text()).unwrap();
        assert_eq!(schema.num_fields(), 3);

        let err = schema
            .spec_field("title", FieldType::full_text("en"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSchema);
    }

    #[test]
    fn frozen_schema_rejects_new_fields() {
        let mut schema = test_schema();
        schema.freeze();
        let err = schema
            .spec_field("extra", FieldType::plain_text())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSchema);
        // Existing fields still re-register quietly.
        schema.spec_field("title", FieldType::plain_text()).unwrap();
    }

    #[test]
    fn dump_load_round_trip() {
        let schema = test_schema();
        let dump = schema.dump().unwrap();
        let loaded = Schema::load(&dump).unwrap();
        assert_eq!(loaded, schema);
        assert!(loaded.fetch_analyzer("content").is_some());
        assert!(loaded.fetch_analyzer("raw").is_none());
    }
}
