use super::Workbook;
use super::address::column_number;
use crate::errors::WorkbookError;
use crate::value::CellValue;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use umya_spreadsheet::{NumberingFormat, Spreadsheet};

const DATE_FORMAT: &str = NumberingFormat::FORMAT_DATE_YYYYMMDD2;
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// [`Workbook`] backed by an xlsx file read fully into memory with umya.
pub struct UmyaWorkbook {
    path: PathBuf,
    book: Option<Spreadsheet>,
}

impl UmyaWorkbook {
    pub fn open(path: &Path) -> Result<Self, WorkbookError> {
        let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| WorkbookError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            book: Some(book),
        })
    }

    fn book(&self) -> Result<&Spreadsheet, WorkbookError> {
        self.book.as_ref().ok_or(WorkbookError::Closed)
    }

    fn book_mut(&mut self) -> Result<&mut Spreadsheet, WorkbookError> {
        self.book.as_mut().ok_or(WorkbookError::Closed)
    }
}

impl Workbook for UmyaWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.book
            .as_ref()
            .map(|book| {
                book.get_sheet_collection()
                    .iter()
                    .map(|sheet| sheet.get_name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn rows(&self, sheet_name: &str) -> Result<Vec<Vec<String>>, WorkbookError> {
        let sheet = self
            .book()?
            .get_sheet_by_name(sheet_name)
            .ok_or_else(|| WorkbookError::SheetNotFound(sheet_name.to_string()))?;

        let mut by_row: BTreeMap<u32, BTreeMap<u32, String>> = BTreeMap::new();
        for cell in sheet.get_cell_collection() {
            let value = cell.get_value().to_string();
            if value.is_empty() {
                continue;
            }
            let coord = cell.get_coordinate();
            by_row
                .entry(*coord.get_row_num())
                .or_default()
                .insert(*coord.get_col_num(), value);
        }

        let last_row = by_row.keys().next_back().copied().unwrap_or(0);
        let mut rows = Vec::with_capacity(last_row as usize);
        for row in 1..=last_row {
            let cells = by_row.remove(&row).unwrap_or_default();
            let width = cells.keys().next_back().copied().unwrap_or(0) as usize;
            let mut values = vec![String::new(); width];
            for (col, value) in cells {
                values[(col - 1) as usize] = value;
            }
            rows.push(values);
        }
        Ok(rows)
    }

    fn set_cell(
        &mut self,
        sheet_name: &str,
        address: &str,
        value: CellValue,
    ) -> Result<(), WorkbookError> {
        validate_address(address)?;
        let sheet = self
            .book_mut()?
            .get_sheet_by_name_mut(sheet_name)
            .ok_or_else(|| WorkbookError::SheetNotFound(sheet_name.to_string()))?;

        match value {
            CellValue::Empty => {
                sheet.get_cell_mut(address).set_blank();
            }
            CellValue::Text(text) => {
                sheet.get_cell_mut(address).set_value_string(text);
            }
            CellValue::Number(n) => {
                sheet.get_cell_mut(address).set_value_number(n);
            }
            CellValue::Bool(b) => {
                sheet.get_cell_mut(address).set_value_bool(b);
            }
            CellValue::Date(date) => {
                sheet
                    .get_cell_mut(address)
                    .set_value_number(date_serial(date));
                sheet
                    .get_style_mut(address)
                    .get_number_format_mut()
                    .set_format_code(DATE_FORMAT);
            }
            CellValue::DateTime(dt) => {
                sheet
                    .get_cell_mut(address)
                    .set_value_number(datetime_serial(dt));
                sheet
                    .get_style_mut(address)
                    .get_number_format_mut()
                    .set_format_code(DATETIME_FORMAT);
            }
        }
        Ok(())
    }

    fn refresh_linked_values(&mut self) -> Result<(), WorkbookError> {
        let book = self.book_mut()?;
        let names: Vec<String> = book
            .get_sheet_collection()
            .iter()
            .map(|sheet| sheet.get_name().to_string())
            .collect();
        for name in names {
            let Some(sheet) = book.get_sheet_by_name_mut(&name) else {
                continue;
            };
            for cell in sheet.get_cell_collection_mut() {
                if cell.is_formula() {
                    cell.get_cell_value_mut()
                        .set_formula_result_default(String::new());
                }
            }
        }
        Ok(())
    }

    fn save(&mut self) -> Result<(), WorkbookError> {
        let path = self.path.clone();
        let book = self.book()?;
        umya_spreadsheet::writer::xlsx::write(book, &path).map_err(|e| WorkbookError::Write {
            path,
            message: e.to_string(),
        })
    }

    fn close(&mut self) -> Result<(), WorkbookError> {
        self.book.take().map(|_| ()).ok_or(WorkbookError::Closed)
    }
}

fn validate_address(address: &str) -> Result<(), WorkbookError> {
    let split = address
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| WorkbookError::InvalidAddress(address.to_string()))?;
    let (letters, digits) = address.split_at(split);
    column_number(letters).map_err(|_| WorkbookError::InvalidAddress(address.to_string()))?;
    match digits.parse::<u32>() {
        Ok(row) if row > 0 => Ok(()),
        _ => Err(WorkbookError::InvalidAddress(address.to_string())),
    }
}

fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).expect("1899-12-30 is a valid date")
}

/// Serial day number in the 1900 date system.
fn date_serial(date: NaiveDate) -> f64 {
    (date - excel_epoch()).num_days() as f64
}

fn datetime_serial(dt: NaiveDateTime) -> f64 {
    let seconds = dt.time().num_seconds_from_midnight() as f64
        + f64::from(dt.time().nanosecond()) / 1_000_000_000.0;
    date_serial(dt.date()) + seconds / 86_400.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serials_follow_the_1900_date_system() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(date_serial(date), 45_292.0);
        let noon = date.and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(datetime_serial(noon), 45_292.5);
    }

    #[test]
    fn address_validation() {
        assert!(validate_address("A1").is_ok());
        assert!(validate_address("XFD1048576").is_ok());
        assert!(validate_address("A0").is_err());
        assert!(validate_address("1A").is_err());
        assert!(validate_address("R").is_err());
    }
}
