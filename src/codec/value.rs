use serde_json::{Number, Value};

use crate::core::error::{Error, Result};
use crate::store::instream::InStream;
use crate::store::outstream::OutStream;

// One-byte type tags. Arrays never tag null elements; those are encoded
// as gaps between present elements.
const TAG_NULL: u8 = 0;
const TAG_TRUE: u8 = 1;
const TAG_FALSE: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_STRING: u8 = 5;
const TAG_ARRAY: u8 = 6;
const TAG_MAP: u8 = 7;

/// Serialize a value. Arrays use run-length-compressed-null encoding: a
/// `C32 gap_to_next_non_null` precedes each present element and a final
/// trailing gap closes the sequence. Maps emit string-keyed entries first.
pub fn write_value(out: &mut OutStream, value: &Value) -> Result<()> {
    match value {
        Value::Null => out.write_u8(TAG_NULL),
        Value::Bool(true) => out.write_u8(TAG_TRUE),
        Value::Bool(false) => out.write_u8(TAG_FALSE),
        Value::Number(num) => {
            if let Some(int) = num.as_i64() {
                out.write_u8(TAG_INT)?;
                out.write_i64(int)
            } else {
                out.write_u8(TAG_FLOAT)?;
                out.write_f64(num.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => {
            out.write_u8(TAG_STRING)?;
            out.write_string(s)
        }
        Value::Array(items) => {
            out.write_u8(TAG_ARRAY)?;
            write_array(out, items)
        }
        Value::Object(map) => {
            out.write_u8(TAG_MAP)?;
            out.write_c32(map.len() as u32)?;
            // All keys are strings here, so the string-keyed group is the
            // whole map and no any-key pairs follow.
            out.write_c32(map.len() as u32)?;
            for (key, value) in map {
                out.write_string(key)?;
                write_value(out, value)?;
            }
            Ok(())
        }
    }
}

fn write_array(out: &mut OutStream, items: &[Value]) -> Result<()> {
    out.write_c32(items.len() as u32)?;
    let mut cursor = 0u32;
    for (index, item) in items.iter().enumerate() {
        if !item.is_null() {
            out.write_c32(index as u32 - cursor)?;
            write_value(out, item)?;
            cursor = index as u32 + 1;
        }
    }
    // Trailing gap covers any nulls after the last present element.
    out.write_c32(items.len() as u32 - cursor)
}

pub fn read_value(stream: &mut InStream) -> Result<Value> {
    let tag = stream.read_u8()?;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_TRUE => Ok(Value::Bool(true)),
        TAG_FALSE => Ok(Value::Bool(false)),
        TAG_INT => Ok(Value::Number(Number::from(stream.read_i64()?))),
        TAG_FLOAT => {
            let raw = stream.read_f64()?;
            Number::from_f64(raw)
                .map(Value::Number)
                .ok_or_else(|| Error::decode("Non-finite float"))
        }
        TAG_STRING => Ok(Value::String(stream.read_string()?)),
        TAG_ARRAY => read_array(stream),
        TAG_MAP => {
            let size = stream.read_c32()?;
            let string_keyed = stream.read_c32()?;
            if string_keyed > size {
                return Err(Error::decode("Map key counts out of order"));
            }
            let mut map = serde_json::Map::with_capacity(size as usize);
            for _ in 0..string_keyed {
                let key = stream.read_string()?;
                map.insert(key, read_value(stream)?);
            }
            if string_keyed != size {
                return Err(Error::decode("Non-string map keys unsupported"));
            }
            Ok(Value::Object(map))
        }
        other => Err(Error::decode(format!("Unknown value tag {}", other))),
    }
}

fn read_array(stream: &mut InStream) -> Result<Value> {
    let size = stream.read_c32()?;
    let mut items = vec![Value::Null; size as usize];
    let mut cursor = 0u32;
    while cursor < size {
        let gap = stream.read_c32()?;
        cursor = cursor
            .checked_add(gap)
            .filter(|&c| c <= size)
            .ok_or_else(|| Error::decode("Array gap past end"))?;
        if cursor == size {
            return Ok(Value::Array(items));
        }
        items[cursor as usize] = read_value(stream)?;
        cursor += 1;
    }
    // A size-zero array or one ending on a present element still carries
    // its trailing gap.
    let trailing = stream.read_c32()?;
    if trailing != 0 {
        return Err(Error::decode("Bad trailing array gap"));
    }
    Ok(Value::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ram_folder::RamFolder;
    use crate::store::folder::Folder;
    use serde_json::json;

    fn round_trip(value: &Value) -> Value {
        let folder = RamFolder::new("codec");
        let mut out = folder.open_out("value").unwrap();
        write_value(&mut out, value).unwrap();
        out.close().unwrap();
        let mut stream = folder.open_in("value").unwrap();
        let result = read_value(&mut stream).unwrap();
        assert_eq!(stream.remaining(), 0, "trailing bytes after {:?}", value);
        result
    }

    #[test]
    fn scalars_round_trip() {
        for value in [
            json!(null),
            json!(true),
            json!(false),
            json!(-12345),
            json!(1.5),
            json!("skald"),
        ] {
            assert_eq!(round_trip(&value), value);
        }
    }

    #[test]
    fn sparse_array_keeps_null_positions() {
        let value = json!([null, null, 42, null]);
        let result = round_trip(&value);
        let items = result.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert!(items[0].is_null());
        assert!(items[1].is_null());
        assert_eq!(items[2], json!(42));
        assert!(items[3].is_null());
    }

    #[test]
    fn dense_and_empty_arrays() {
        for value in [json!([]), json!([1, 2, 3]), json!([null, null])] {
            assert_eq!(round_trip(&value), value);
        }
    }

    #[test]
    fn nested_maps_round_trip() {
        let value = json!({
            "counts": {"title": 2, "content": 40},
            "entries": ["a", null, "b"],
        });
        assert_eq!(round_trip(&value), value);
    }
}
