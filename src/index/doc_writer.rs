use std::sync::Arc;

use serde_json::json;

use crate::core::error::{Error, Result};
use crate::core::types::FieldValue;
use crate::index::segment::Segment;
use crate::store::folder::Folder;
use crate::store::outstream::OutStream;

pub const DOCS_FORMAT: i64 = 1;

const VALUE_TEXT: u8 = 0;
const VALUE_BYTES: u8 = 1;
const VALUE_I32: u8 = 2;
const VALUE_I64: u8 = 3;
const VALUE_F32: u8 = 4;
const VALUE_F64: u8 = 5;

/// Serializes stored fields into the `documents.dat` heap, with one
/// fixed-width offset per doc in `documents.ix` for random access.
pub struct DocWriter {
    dat_out: Option<OutStream>,
    ix_out: Option<OutStream>,
}

impl DocWriter {
    pub fn new(folder: &Arc<dyn Folder>, seg_name: &str) -> Result<Self> {
        let dat_out = folder.open_out(&format!("{}/documents.dat", seg_name))?;
        let ix_out = folder.open_out(&format!("{}/documents.ix", seg_name))?;
        Ok(DocWriter {
            dat_out: Some(dat_out),
            ix_out: Some(ix_out),
        })
    }

    /// Append one doc's stored fields. Docs must arrive in doc-id order.
    pub fn add_doc(&mut self, stored: &[(&str, &FieldValue)]) -> Result<()> {
        let (Some(dat_out), Some(ix_out)) = (self.dat_out.as_mut(), self.ix_out.as_mut()) else {
            return Err(Error::internal("add_doc after finish"));
        };

        ix_out.write_i64(dat_out.tell() as i64)?;
        dat_out.write_c32(stored.len() as u32)?;
        for (name, value) in stored {
            dat_out.write_string(name)?;
            write_field_value(dat_out, value)?;
        }
        Ok(())
    }

    pub fn finish(&mut self, segment: &mut Segment) -> Result<()> {
        if let Some(mut dat_out) = self.dat_out.take() {
            dat_out.close()?;
        }
        if let Some(mut ix_out) = self.ix_out.take() {
            ix_out.close()?;
        }
        segment.store_metadata("documents", json!({"format": DOCS_FORMAT}))
    }
}

fn write_field_value(out: &mut OutStream, value: &FieldValue) -> Result<()> {
    match value {
        FieldValue::Text(text) => {
            out.write_u8(VALUE_TEXT)?;
            out.write_string(text)
        }
        FieldValue::Bytes(bytes) => {
            out.write_u8(VALUE_BYTES)?;
            out.write_c32(bytes.len() as u32)?;
            out.write_bytes(bytes)
        }
        FieldValue::I32(v) => {
            out.write_u8(VALUE_I32)?;
            out.write_i32(*v)
        }
        FieldValue::I64(v) => {
            out.write_u8(VALUE_I64)?;
            out.write_i64(*v)
        }
        FieldValue::F32(v) => {
            out.write_u8(VALUE_F32)?;
            out.write_f32(*v)
        }
        FieldValue::F64(v) => {
            out.write_u8(VALUE_F64)?;
            out.write_f64(*v)
        }
    }
}

pub(crate) fn read_field_value(
    stream: &mut crate::store::instream::InStream,
) -> Result<FieldValue> {
    match stream.read_u8()? {
        VALUE_TEXT => Ok(FieldValue::Text(stream.read_string()?)),
        VALUE_BYTES => {
            let len = stream.read_c32()? as usize;
            let mut bytes = vec![0u8; len];
            stream.read_bytes(&mut bytes)?;
            Ok(FieldValue::Bytes(bytes))
        }
        VALUE_I32 => Ok(FieldValue::I32(stream.read_i32()?)),
        VALUE_I64 => Ok(FieldValue::I64(stream.read_i64()?)),
        VALUE_F32 => Ok(FieldValue::F32(stream.read_f32()?)),
        VALUE_F64 => Ok(FieldValue::F64(stream.read_f64()?)),
        other => Err(Error::decode(format!("Unknown stored value tag {}", other))),
    }
}
