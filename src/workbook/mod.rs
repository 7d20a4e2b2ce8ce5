pub mod address;
mod umya;

pub use umya::UmyaWorkbook;

use crate::errors::WorkbookError;
use crate::value::CellValue;

/// Editable, in-memory workbook used for one generation run.
///
/// Rows are returned as ragged string vectors: row `n` (1-based) lives at
/// index `n - 1`, and trailing empty cells are omitted.
pub trait Workbook {
    fn sheet_names(&self) -> Vec<String>;

    fn rows(&self, sheet: &str) -> Result<Vec<Vec<String>>, WorkbookError>;

    /// Write a typed value to an A1 address. [`CellValue::Empty`] clears the cell.
    fn set_cell(&mut self, sheet: &str, address: &str, value: CellValue)
    -> Result<(), WorkbookError>;

    /// Invalidate cached formula results so they are recomputed on open.
    fn refresh_linked_values(&mut self) -> Result<(), WorkbookError>;

    fn save(&mut self) -> Result<(), WorkbookError>;

    fn close(&mut self) -> Result<(), WorkbookError>;
}
