use crate::analysis::{Inversion, Token};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Document, FieldValue};
use crate::index::segment::Segment;
use crate::plan::{PostingVariant, PrimitiveId, Schema};

/// One field of one document after inversion: its segment field number,
/// the value to store, and (for indexed fields) the token stream headed
/// for the posting accumulator.
#[derive(Debug)]
pub struct InvertedField {
    pub field_num: u32,
    pub name: String,
    pub stored: Option<FieldValue>,
    pub inversion: Option<Inversion>,
    pub variant: PostingVariant,
    pub highlightable: bool,
    pub boost: f32,
}

/// Routes a document's fields through the schema: text through the
/// field's analyzer, numerics as single canonical tokens, blobs straight
/// to storage.
pub struct Inverter;

impl Inverter {
    pub fn invert_doc(
        schema: &Schema,
        segment: &mut Segment,
        doc: &Document,
    ) -> Result<Vec<InvertedField>> {
        let mut entries = Vec::with_capacity(doc.fields.len());
        for (name, value) in &doc.fields {
            let field_type = schema.fetch_type(name).ok_or_else(|| {
                Error::new(ErrorKind::UnknownField, format!("Unknown field name: '{}'", name))
            })?;
            let field_num = segment.add_field(name);

            let inversion = if field_type.is_indexed() {
                Some(match (field_type.primitive_id(), value) {
                    (PrimitiveId::Text, FieldValue::Text(text)) => {
                        let analyzer = schema.fetch_analyzer(name).ok_or_else(|| {
                            Error::internal(format!("No analyzer for text field '{}'", name))
                        })?;
                        analyzer.transform_text(text)?
                    }
                    (PrimitiveId::I32, FieldValue::I32(v)) => single_token(v.to_string()),
                    (PrimitiveId::I64, FieldValue::I64(v)) => single_token(v.to_string()),
                    (PrimitiveId::F32, FieldValue::F32(v)) => single_token(v.to_string()),
                    (PrimitiveId::F64, FieldValue::F64(v)) => single_token(v.to_string()),
                    _ => {
                        return Err(Error::bad_argument(format!(
                            "Value of field '{}' doesn't match its type",
                            name
                        )));
                    }
                })
            } else {
                check_value_matches(name, field_type.primitive_id(), value)?;
                None
            };

            entries.push(InvertedField {
                field_num,
                name: name.clone(),
                stored: field_type.is_stored().then(|| value.clone()),
                inversion,
                variant: field_type.posting_variant(),
                highlightable: field_type.is_highlightable(),
                boost: field_type.boost(),
            });
        }
        Ok(entries)
    }
}

fn single_token(text: String) -> Inversion {
    let cp_len = text.chars().count() as u32;
    let mut inversion = Inversion::new();
    inversion.append(Token::new(text, 0, cp_len));
    inversion
}

fn check_value_matches(name: &str, primitive: PrimitiveId, value: &FieldValue) -> Result<()> {
    let matches = matches!(
        (primitive, value),
        (PrimitiveId::Text, FieldValue::Text(_))
            | (PrimitiveId::Blob, FieldValue::Bytes(_))
            | (PrimitiveId::I32, FieldValue::I32(_))
            | (PrimitiveId::I64, FieldValue::I64(_))
            | (PrimitiveId::F32, FieldValue::F32(_))
            | (PrimitiveId::F64, FieldValue::F64(_))
    );
    if matches {
        Ok(())
    } else {
        Err(Error::bad_argument(format!(
            "Value of field '{}' doesn't match its type",
            name
        )))
    }
}
