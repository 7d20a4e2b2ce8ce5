pub mod cli;
pub mod config;
pub mod context;
pub mod datasource;
pub mod encode;
pub mod errors;
pub mod logging;
pub mod placeholder;
pub mod report;
pub mod value;
pub mod workbook;

pub use config::{AppConfig, CliArgs, DataSourceConfig, FetchErrorPolicy, ReportConfig};
pub use context::{Interrupted, RunContext};
pub use datasource::DataSource;
pub use errors::ReportError;
pub use report::{ReportGenerator, ReportSummary};
pub use value::{CellValue, FetchedRow, FieldValue};
pub use workbook::{UmyaWorkbook, Workbook};
