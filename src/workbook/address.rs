use crate::errors::WorkbookError;
use umya_spreadsheet::helper::coordinate::coordinate_from_index;

/// Highest column supported by the xlsx format (`XFD`).
pub const MAX_COLUMN: u32 = 16_384;

/// Convert column letters (`A`, `R`, `AA`) to a 1-based column number.
///
/// Letters are case-insensitive. Anything beyond `XFD` is rejected.
pub fn column_number(letters: &str) -> Result<u32, WorkbookError> {
    if letters.is_empty() {
        return Err(WorkbookError::InvalidColumn(letters.to_string()));
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return Err(WorkbookError::InvalidColumn(letters.to_string()));
        }
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        if col > MAX_COLUMN {
            return Err(WorkbookError::InvalidColumn(letters.to_string()));
        }
    }
    Ok(col)
}

/// Zero-based index of a column, as used for positions within a row.
pub fn column_index(letters: &str) -> Result<usize, WorkbookError> {
    column_number(letters).map(|col| (col - 1) as usize)
}

/// A1-style address for a 1-based column and row.
pub fn cell_address(col: u32, row: u32) -> Result<String, WorkbookError> {
    if col == 0 || col > MAX_COLUMN || row == 0 {
        return Err(WorkbookError::InvalidAddress(format!("({col}, {row})")));
    }
    Ok(coordinate_from_index(&col, &row))
}

/// A1-style address for a zero-based cell index within a 1-based row.
pub fn address_for_index(index: usize, row: u32) -> Result<String, WorkbookError> {
    let col = u32::try_from(index + 1)
        .map_err(|_| WorkbookError::InvalidAddress(format!("column index {index}")))?;
    cell_address(col, row)
}
