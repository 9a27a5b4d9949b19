use crate::core::error::{Error, Result};
use crate::core::types::{DocId, Document};
use crate::index::doc_writer::read_field_value;
use crate::store::folder::Folder;
use crate::store::instream::InStream;

/// Fetches stored fields by doc id: one `.ix` lookup, then a parse of the
/// self-delimiting record in the heap.
pub struct DocReader {
    dat: InStream,
    ix: InStream,
    doc_max: DocId,
}

impl DocReader {
    pub fn open(folder: &dyn Folder, doc_max: DocId) -> Result<Self> {
        Ok(DocReader {
            dat: folder.open_in("documents.dat")?,
            ix: folder.open_in("documents.ix")?,
            doc_max,
        })
    }

    pub fn fetch(&mut self, doc_id: DocId) -> Result<Document> {
        if doc_id == 0 || doc_id > self.doc_max {
            return Err(Error::bad_argument(format!(
                "Doc id {} out of range [1, {}]",
                doc_id, self.doc_max
            )));
        }
        self.ix.seek((doc_id as u64 - 1) * 8)?;
        let offset = self.ix.read_i64()? as u64;
        self.dat.seek(offset)?;

        let num_fields = self.dat.read_c32()?;
        let mut doc = Document::new();
        for _ in 0..num_fields {
            let name = self.dat.read_string()?;
            let value = read_field_value(&mut self.dat)?;
            doc.add_field(&name, value);
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FieldValue;
    use crate::index::doc_writer::DocWriter;
    use crate::index::segment::Segment;
    use crate::store::ram_folder::RamFolder;
    use std::sync::Arc;

    #[test]
    fn stored_fields_round_trip() {
        let folder = Arc::new(RamFolder::new("index"));
        folder.mkdir("seg_1").unwrap();
        let shared: Arc<dyn Folder> = Arc::clone(&folder) as Arc<dyn Folder>;

        let mut writer = DocWriter::new(&shared, "seg_1").unwrap();
        let title = FieldValue::Text("Lorem ipsum".to_string());
        let blob = FieldValue::Bytes(vec![0, 159, 146, 150]);
        let year = FieldValue::I64(-3);
        let rank = FieldValue::F32(0.5);
        writer.add_doc(&[("title", &title)]).unwrap();
        writer
            .add_doc(&[("blob", &blob), ("rank", &rank), ("year", &year)])
            .unwrap();
        let mut segment = Segment::new(1);
        writer.finish(&mut segment).unwrap();

        let seg_folder = folder.find_folder("seg_1").unwrap();
        let mut reader = DocReader::open(&*seg_folder, 2).unwrap();

        let doc1 = reader.fetch(1).unwrap();
        assert_eq!(doc1.get_field("title"), Some(&title));

        let doc2 = reader.fetch(2).unwrap();
        assert_eq!(doc2.get_field("blob"), Some(&blob));
        assert_eq!(doc2.get_field("year"), Some(&year));
        assert_eq!(doc2.get_field("rank"), Some(&rank));

        // Fetches are random access in any order.
        assert_eq!(reader.fetch(1).unwrap().get_field("title"), Some(&title));
        assert!(reader.fetch(0).is_err());
        assert!(reader.fetch(3).is_err());
    }
}
