use crate::context::Interrupted;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to encode {type_name} value as JSON: {source}")]
    Json {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("template parse error at byte {offset}: {message}")]
    Parse { offset: usize, message: String },
    #[error("template execution failed: {0}")]
    Execute(String),
}

impl ResolveError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        ResolveError::Parse {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn execute(message: impl Into<String>) -> Self {
        ResolveError::Execute(message.into())
    }
}

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("failed to read workbook '{path}': {message}")]
    Read { path: PathBuf, message: String },
    #[error("failed to write workbook '{path}': {message}")]
    Write { path: PathBuf, message: String },
    #[error("sheet '{0}' not found")]
    SheetNotFound(String),
    #[error("invalid cell address '{0}'")]
    InvalidAddress(String),
    #[error("invalid column name '{0}' (expected letters A through XFD)")]
    InvalidColumn(String),
    #[error("workbook is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("query returned no rows")]
    NoRows,
    #[error("query returned multiple rows")]
    MultipleRows,
    #[error("data source is closed")]
    Closed,
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("query interrupted: {0}")]
    Interrupted(#[from] Interrupted),
    #[error("unsupported data source DSN scheme '{0}'")]
    UnsupportedDsn(String),
    #[error("connect to data source: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("execute query: {0}")]
    Query(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("stat source file: {0}")]
    Stat(#[source] io::Error),
    #[error("source is not a regular file")]
    NotRegularFile,
    #[error("open source file: {0}")]
    Open(#[source] io::Error),
    #[error("create destination directory '{dir}': {source}")]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("create destination file: {0}")]
    Create(#[source] io::Error),
    #[error("copy content: {0}")]
    Write(#[source] io::Error),
    #[error("sync destination file: {0}")]
    Sync(#[source] io::Error),
}

/// Failure while processing a single row. Always fatal for the run.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("referenced query file not found at '{0}'")]
    QueryFileNotFound(PathBuf),
    #[error("read query file '{path}': {source}")]
    ReadQuery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("fetch data using query from '{path}': {source}")]
    Fetch {
        path: PathBuf,
        #[source]
        source: DataSourceError,
    },
    #[error("encode value for cell {cell}: {source}")]
    Encode {
        cell: String,
        #[source]
        source: EncodeError,
    },
}

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("get rows from sheet: {0}")]
    ReadRows(#[source] WorkbookError),
    #[error("processing interrupted before row {row}: {source}")]
    Interrupted {
        row: u32,
        #[source]
        source: Interrupted,
    },
    #[error("processing row {row}: {source}")]
    Row {
        row: u32,
        #[source]
        source: RowError,
    },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("copy template file from '{from}' to '{to}': {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: CopyError,
    },
    #[error("open copied report file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: WorkbookError,
    },
    #[error("template file '{0}' contains no sheets")]
    EmptyWorkbook(PathBuf),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("processing sheet '{sheet}': {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: SheetError,
    },
    #[error("processing interrupted after sheet '{sheet}': {source}")]
    Interrupted {
        sheet: String,
        #[source]
        source: Interrupted,
    },
    #[error("save generated report file '{path}': {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: WorkbookError,
    },
}

impl ReportError {
    /// The cancellation or deadline that ended the run, if any.
    pub fn interruption(&self) -> Option<Interrupted> {
        match self {
            ReportError::Interrupted { source, .. } => Some(*source),
            ReportError::Sheet { source, .. } => match source {
                SheetError::Interrupted { source, .. } => Some(*source),
                SheetError::Row {
                    source:
                        RowError::Fetch {
                            source: DataSourceError::Interrupted(reason),
                            ..
                        },
                    ..
                } => Some(*reason),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.interruption() == Some(Interrupted::DeadlineExceeded)
    }

    pub fn is_cancelled(&self) -> bool {
        self.interruption() == Some(Interrupted::Cancelled)
    }
}

/// Every configuration problem found during validation, keyed by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    problems: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn new(problems: BTreeMap<String, String>) -> Self {
        Self { problems }
    }

    pub fn problems(&self) -> &BTreeMap<String, String> {
        &self.problems
    }

    pub fn problem(&self, key: &str) -> Option<&str> {
        self.problems.get(key).map(String::as_str)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid configuration:")?;
        for (key, problem) in &self.problems {
            write!(f, "\n - {key}: {problem}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}
