//! Tuple byte encoding and the `Tuple` capability trait.
//!
//! A single polymorphic tuple type is split into two concrete variants
//! behind one trait: `PageTuple`
//! for bytes read back out of a heap page, and `LiteralTuple` for values
//! built in memory (new rows being inserted, rows reconstructed during
//! recovery). Neither needs virtual dispatch over the other — they just
//! share the same read-only accessor surface.

use catalog::TableSchema;
use common::{ColumnId, DbError, DbResult};
use types::{SqlType, Value};

/// Read-only accessors common to any materialized row, regardless of
/// whether its bytes live on a page or only in memory.
pub trait Tuple {
    fn column_count(&self) -> usize;
    fn get(&self, column: ColumnId) -> DbResult<&Value>;

    fn is_null(&self, column: ColumnId) -> DbResult<bool> {
        Ok(matches!(self.get(column)?, Value::Null))
    }
}

/// A tuple decoded from a heap page's slot bytes.
#[derive(Debug, Clone)]
pub struct PageTuple {
    values: Vec<Value>,
}

impl PageTuple {
    pub fn from_bytes(schema: &TableSchema, bytes: &[u8]) -> DbResult<Self> {
        Ok(Self {
            values: decode_tuple(schema, bytes)?,
        })
    }
}

impl Tuple for PageTuple {
    fn column_count(&self) -> usize {
        self.values.len()
    }

    fn get(&self, column: ColumnId) -> DbResult<&Value> {
        self.values
            .get(column as usize)
            .ok_or_else(|| DbError::InvalidFilePointer(format!("no such column {column}")))
    }
}

/// A tuple built in memory: a row about to be inserted, or one
/// reconstructed from a WAL record during recovery.
#[derive(Debug, Clone)]
pub struct LiteralTuple {
    values: Vec<Value>,
}

impl LiteralTuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl Tuple for LiteralTuple {
    fn column_count(&self) -> usize {
        self.values.len()
    }

    fn get(&self, column: ColumnId) -> DbResult<&Value> {
        self.values
            .get(column as usize)
            .ok_or_else(|| DbError::InvalidFilePointer(format!("no such column {column}")))
    }
}

fn null_bitmap_len(num_columns: usize) -> usize {
    num_columns.div_ceil(8)
}

/// Encode a row into the byte layout stored in a heap page's tuple region:
/// a null bitmap, followed by one fixed- or variable-width field per
/// non-null column in schema order.
pub fn encode_tuple(schema: &TableSchema, values: &[Value]) -> DbResult<Vec<u8>> {
    if values.len() != schema.len() {
        return Err(DbError::DataFormat(format!(
            "expected {} values, got {}",
            schema.len(),
            values.len()
        )));
    }

    let mut bitmap = vec![0u8; null_bitmap_len(values.len())];
    let mut body = Vec::new();

    for (idx, (value, column)) in values.iter().zip(schema.columns.iter()).enumerate() {
        if matches!(value, Value::Null) {
            bitmap[idx / 8] |= 1 << (idx % 8);
            continue;
        }
        encode_field(&mut body, &column.ty, value)?;
    }

    let mut out = Vec::with_capacity(bitmap.len() + body.len());
    out.extend_from_slice(&bitmap);
    out.extend_from_slice(&body);
    Ok(out)
}

fn encode_field(out: &mut Vec<u8>, ty: &SqlType, value: &Value) -> DbResult<()> {
    match (ty, value) {
        (SqlType::Int, Value::Int(v)) => {
            out.extend_from_slice(&v.to_be_bytes());
            Ok(())
        }
        (SqlType::Bool, Value::Bool(v)) => {
            out.push(*v as u8);
            Ok(())
        }
        (SqlType::Text, Value::Text(s)) => {
            if s.len() > crate::codec::VARSTRING65535_MAX {
                return Err(DbError::TupleTooLarge(format!(
                    "text value of {} bytes exceeds VARSTRING65535 limit",
                    s.len()
                )));
            }
            out.extend_from_slice(&(s.len() as u16).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
            Ok(())
        }
        (ty, value) => Err(DbError::DataFormat(format!(
            "value {value:?} does not match column type {ty:?}"
        ))),
    }
}

/// Decode a row back out of the byte layout `encode_tuple` produces.
pub fn decode_tuple(schema: &TableSchema, bytes: &[u8]) -> DbResult<Vec<Value>> {
    let bitmap_len = null_bitmap_len(schema.len());
    if bytes.len() < bitmap_len {
        return Err(DbError::DataFormat(
            "tuple bytes shorter than its own null bitmap".into(),
        ));
    }
    let bitmap = &bytes[..bitmap_len];
    let mut cursor = bitmap_len;
    let mut values = Vec::with_capacity(schema.len());

    for (idx, column) in schema.columns.iter().enumerate() {
        if bitmap[idx / 8] & (1 << (idx % 8)) != 0 {
            values.push(Value::Null);
            continue;
        }
        let (value, consumed) = decode_field(&column.ty, &bytes[cursor..])?;
        cursor += consumed;
        values.push(value);
    }
    Ok(values)
}

fn decode_field(ty: &SqlType, bytes: &[u8]) -> DbResult<(Value, usize)> {
    match ty {
        SqlType::Int => {
            if bytes.len() < 8 {
                return Err(DbError::DataFormat("truncated int field".into()));
            }
            let v = i64::from_be_bytes(bytes[..8].try_into().unwrap());
            Ok((Value::Int(v), 8))
        }
        SqlType::Bool => {
            if bytes.is_empty() {
                return Err(DbError::DataFormat("truncated bool field".into()));
            }
            Ok((Value::Bool(bytes[0] != 0), 1))
        }
        SqlType::Text => {
            if bytes.len() < 2 {
                return Err(DbError::DataFormat("truncated text length prefix".into()));
            }
            let len = u16::from_be_bytes(bytes[..2].try_into().unwrap()) as usize;
            if bytes.len() < 2 + len {
                return Err(DbError::DataFormat("truncated text field".into()));
            }
            let s = String::from_utf8(bytes[2..2 + len].to_vec())
                .map_err(|e| DbError::DataFormat(e.to_string()))?;
            Ok((Value::Text(s), 2 + len))
        }
    }
}
