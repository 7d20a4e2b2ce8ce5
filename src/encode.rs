use crate::errors::EncodeError;
use crate::value::{CellValue, FieldValue};

/// Convert a resolved value into something the spreadsheet can store natively.
///
/// Scalars keep their type so numbers, booleans and dates stay typed cells.
/// Bytes become text, structured values become compact JSON text, and null
/// clears the cell.
pub fn encode(value: &FieldValue) -> Result<CellValue, EncodeError> {
    let encoded = match value {
        FieldValue::Null => CellValue::Empty,
        FieldValue::Bool(b) => CellValue::Bool(*b),
        FieldValue::Int(n) => CellValue::Number(*n as f64),
        FieldValue::Float(n) => CellValue::Number(*n),
        FieldValue::Text(s) => CellValue::Text(s.clone()),
        FieldValue::Bytes(bytes) => CellValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        FieldValue::Date(d) => CellValue::Date(*d),
        FieldValue::DateTime(dt) => CellValue::DateTime(*dt),
        FieldValue::Infinity | FieldValue::NegativeInfinity => CellValue::Text(value.to_string()),
        FieldValue::Json(json) => {
            let text = serde_json::to_string(json).map_err(|source| EncodeError::Json {
                type_name: value.type_name(),
                source,
            })?;
            CellValue::Text(text)
        }
    };
    Ok(encoded)
}
