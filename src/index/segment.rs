use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::core::error::{Error, ErrorKind, Result};
use crate::store::folder::Folder;
use crate::util::base36::{from_base36, to_base36};
use crate::util::json::{slurp_json, spew_json, JsonOptions};

pub const SEG_META: &str = "segmeta.json";
const SEG_FORMAT: i64 = 1;

/// An immutable unit of index state. Identified by a monotonically
/// increasing number, serialized as the base-36 directory name
/// `seg_<number>`. Field numbers start at 1; 0 is reserved for "missing"
/// and a number never rebinds within a segment.
pub struct Segment {
    number: u64,
    name: String,
    count: u64,
    by_num: Vec<String>,
    by_name: HashMap<String, u32>,
    metadata: Map<String, Value>,
}

impl Segment {
    pub fn new(number: u64) -> Self {
        Segment {
            number,
            name: Segment::num_to_name(number),
            count: 0,
            // Slot 0 is the "missing field" placeholder.
            by_num: vec![String::new()],
            by_name: HashMap::new(),
            metadata: Map::new(),
        }
    }

    pub fn num_to_name(number: u64) -> String {
        format!("seg_{}", to_base36(number))
    }

    pub fn valid_seg_name(name: &str) -> bool {
        match name.strip_prefix("seg_") {
            Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_alphanumeric()),
            None => false,
        }
    }

    pub fn name_to_num(name: &str) -> Result<u64> {
        let rest = name
            .strip_prefix("seg_")
            .ok_or_else(|| Error::decode(format!("Not a segment name: '{}'", name)))?;
        from_base36(rest)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn set_count(&mut self, count: u64) {
        self.count = count;
    }

    pub fn increment_count(&mut self, increment: u64) -> u64 {
        self.count += increment;
        self.count
    }

    /// Field number for `field`, assigning the next free number on first
    /// sight.
    pub fn add_field(&mut self, field: &str) -> u32 {
        if let Some(&num) = self.by_name.get(field) {
            return num;
        }
        let num = self.by_num.len() as u32;
        self.by_name.insert(field.to_string(), num);
        self.by_num.push(field.to_string());
        num
    }

    pub fn field_num(&self, field: &str) -> u32 {
        self.by_name.get(field).copied().unwrap_or(0)
    }

    pub fn field_name(&self, field_num: u32) -> Option<&str> {
        if field_num == 0 {
            return None;
        }
        self.by_num.get(field_num as usize).map(String::as_str)
    }

    pub fn num_fields(&self) -> u32 {
        self.by_num.len() as u32 - 1
    }

    /// Attach a component's metadata; each key is claimed once.
    pub fn store_metadata(&mut self, key: &str, value: Value) -> Result<()> {
        if self.metadata.contains_key(key) {
            return Err(Error::internal(format!(
                "Metadata key '{}' already registered",
                key
            )));
        }
        self.metadata.insert(key.to_string(), value);
        Ok(())
    }

    pub fn fetch_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn write_file(&mut self, folder: &dyn Folder) -> Result<()> {
        let my_meta = json!({
            "count": self.count,
            "name": self.name,
            "field_names": self.by_num,
            "format": SEG_FORMAT,
        });
        self.metadata.insert("segmeta".to_string(), my_meta);
        let path = format!("{}/{}", self.name, SEG_META);
        spew_json(
            &Value::Object(self.metadata.clone()),
            folder,
            &path,
            JsonOptions::default(),
        )
    }

    pub fn read_file(&mut self, folder: &dyn Folder) -> Result<()> {
        let path = format!("{}/{}", self.name, SEG_META);
        let metadata = slurp_json(folder, &path, JsonOptions::default())?;
        let Value::Object(metadata) = metadata else {
            return Err(Error::corrupt(format!("'{}' is not a JSON object", path)));
        };

        let my_meta = metadata
            .get("segmeta")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::corrupt(format!("Missing 'segmeta' in '{}'", path)))?;

        // Older metadata spelled the count 'doc_count'.
        let count = my_meta
            .get("count")
            .or_else(|| my_meta.get("doc_count"))
            .and_then(json_as_u64)
            .ok_or_else(|| Error::corrupt(format!("Missing 'count' in '{}'", path)))?;

        let field_names = my_meta
            .get("field_names")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::corrupt(format!("Failed to extract 'field_names' from '{}'", path))
            })?;

        self.count = count;
        self.by_num = vec![String::new()];
        self.by_name = HashMap::new();
        for name in field_names.iter().skip(1) {
            let name = name.as_str().ok_or_else(|| {
                Error::corrupt(format!("Non-string field name in '{}'", path))
            })?;
            self.add_field(name);
        }
        self.metadata = metadata;
        Ok(())
    }
}

/// Accept numbers that arrive as JSON numbers or as decimal strings.
fn json_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(num) => num.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::folder::Folder;
    use crate::store::ram_folder::RamFolder;

    #[test]
    fn base36_names() {
        assert_eq!(Segment::num_to_name(1), "seg_1");
        assert_eq!(Segment::num_to_name(35), "seg_z");
        assert_eq!(Segment::num_to_name(36), "seg_10");
        assert_eq!(Segment::name_to_num("seg_10").unwrap(), 36);
        assert!(Segment::valid_seg_name("seg_4a"));
        assert!(!Segment::valid_seg_name("seg_"));
        assert!(!Segment::valid_seg_name("snapshot_1.json"));
        assert!(!Segment::valid_seg_name("seg_4/x"));
    }

    #[test]
    fn field_numbers_start_at_one_and_never_rebind() {
        let mut seg = Segment::new(1);
        assert_eq!(seg.add_field("title"), 1);
        assert_eq!(seg.add_field("content"), 2);
        assert_eq!(seg.add_field("title"), 1);
        assert_eq!(seg.field_num("missing"), 0);
        assert_eq!(seg.field_name(1), Some("title"));
        assert_eq!(seg.field_name(0), None);
        assert_eq!(seg.num_fields(), 2);
    }

    #[test]
    fn metadata_round_trip() {
        let folder = RamFolder::new("index");
        folder.mkdir("seg_1").unwrap();

        let mut seg = Segment::new(1);
        seg.add_field("title");
        seg.add_field("content");
        seg.set_count(42);
        seg.store_metadata("lexicon", json!({"format": 3})).unwrap();
        seg.write_file(&folder).unwrap();

        let mut read_back = Segment::new(1);
        read_back.read_file(&folder).unwrap();
        assert_eq!(read_back.count(), 42);
        assert_eq!(read_back.field_num("content"), 2);
        assert_eq!(
            read_back.fetch_metadata("lexicon"),
            Some(&json!({"format": 3}))
        );
    }

    #[test]
    fn duplicate_metadata_key_is_an_error() {
        let mut seg = Segment::new(1);
        seg.store_metadata("lexicon", json!({})).unwrap();
        let err = seg.store_metadata("lexicon", json!({})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn legacy_doc_count_key_is_accepted() {
        let folder = RamFolder::new("index");
        folder.mkdir("seg_1").unwrap();
        let metadata = json!({
            "segmeta": {
                "doc_count": "7",
                "name": "seg_1",
                "field_names": ["", "title"],
                "format": 1,
            }
        });
        spew_json(
            &metadata,
            &folder,
            "seg_1/segmeta.json",
            JsonOptions::default(),
        )
        .unwrap();

        let mut seg = Segment::new(1);
        seg.read_file(&folder).unwrap();
        assert_eq!(seg.count(), 7);
        assert_eq!(seg.field_num("title"), 1);
    }
}
