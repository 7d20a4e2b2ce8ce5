use sheet_report::config::{FetchErrorPolicy, ReportConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use umya_spreadsheet::{NumberingFormat, Worksheet};

#[derive(Clone, Debug)]
pub enum CellVal {
    Text(String),
    Num(f64),
    Date(f64),
    Formula(String),
    Empty,
}

impl From<&str> for CellVal {
    fn from(s: &str) -> Self {
        CellVal::Text(s.to_string())
    }
}

impl From<f64> for CellVal {
    fn from(n: f64) -> Self {
        CellVal::Num(n)
    }
}

impl From<i32> for CellVal {
    fn from(n: i32) -> Self {
        CellVal::Num(n as f64)
    }
}

fn set_cell(sheet: &mut Worksheet, address: &str, val: &CellVal) {
    match val {
        CellVal::Text(s) => {
            sheet.get_cell_mut(address).set_value(s.clone());
        }
        CellVal::Num(n) => {
            sheet.get_cell_mut(address).set_value_number(*n);
        }
        CellVal::Date(serial) => {
            sheet.get_cell_mut(address).set_value_number(*serial);
            sheet
                .get_style_mut(address)
                .get_number_format_mut()
                .set_format_code(NumberingFormat::FORMAT_DATE_YYYYMMDD2);
        }
        CellVal::Formula(f) => {
            sheet.get_cell_mut(address).set_formula(f.clone());
        }
        CellVal::Empty => {}
    }
}

/// One sheet of a fixture: its name and `(address, value)` pairs.
pub struct SheetSpec {
    pub name: &'static str,
    pub cells: Vec<(&'static str, CellVal)>,
}

impl SheetSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cells: Vec::new(),
        }
    }

    pub fn cell(mut self, address: &'static str, value: impl Into<CellVal>) -> Self {
        self.cells.push((address, value.into()));
        self
    }
}

pub fn write_template(path: &Path, sheets: &[SheetSpec]) {
    let mut book = umya_spreadsheet::new_file();
    for (index, spec) in sheets.iter().enumerate() {
        let sheet = if index == 0 {
            let sheet = book
                .get_sheet_by_name_mut("Sheet1")
                .expect("default sheet exists");
            sheet.set_name(spec.name);
            sheet
        } else {
            book.new_sheet(spec.name).expect("add sheet")
        };
        for (address, value) in &spec.cells {
            set_cell(sheet, address, value);
        }
    }
    umya_spreadsheet::writer::xlsx::write(&book, path).expect("write template");
}

/// Formatted value of a cell in a saved workbook; empty when the cell is absent.
pub fn cell_value(path: &Path, sheet: &str, address: &str) -> String {
    let book = umya_spreadsheet::reader::xlsx::read(path).expect("read workbook");
    let sheet = book.get_sheet_by_name(sheet).expect("sheet exists");
    sheet
        .get_cell(address)
        .map(|cell| cell.get_value().to_string())
        .unwrap_or_default()
}

/// Every non-empty cell of every sheet as `(sheet, address, value)`, sorted.
pub fn all_values(path: &Path) -> Vec<(String, String, String)> {
    let book = umya_spreadsheet::reader::xlsx::read(path).expect("read workbook");
    let mut values = Vec::new();
    for sheet in book.get_sheet_collection() {
        for cell in sheet.get_cell_collection() {
            let value = cell.get_value().to_string();
            if value.is_empty() {
                continue;
            }
            values.push((
                sheet.get_name().to_string(),
                cell.get_coordinate().get_coordinate(),
                value,
            ));
        }
    }
    values.sort();
    values
}

pub fn write_query(queries_dir: &Path, relative: &str, sql: &str) -> PathBuf {
    let path = queries_dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create query dir");
    }
    fs::write(&path, sql).expect("write query");
    path
}

pub fn report_config(root: &Path, template: &Path) -> ReportConfig {
    ReportConfig {
        template_path: template.to_path_buf(),
        output_path: root.join("out").join("report.xlsx"),
        queries_dir: root.join("queries"),
        ref_column: "R".to_string(),
        timeout: Duration::from_secs(60),
        fetch_error_policy: FetchErrorPolicy::Fail,
    }
}
