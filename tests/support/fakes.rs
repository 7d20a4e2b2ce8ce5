use async_trait::async_trait;
use indexmap::IndexMap;
use sheet_report::errors::{DataSourceError, WorkbookError};
use sheet_report::{CellValue, DataSource, FetchedRow, FieldValue, RunContext, Workbook};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Clone, Debug)]
pub enum Response {
    Row(FetchedRow),
    NoRows,
    MultipleRows,
    Fail(&'static str),
    /// Never answers; only the run context can end the fetch.
    Hang,
}

/// In-memory data source keyed by trimmed query text.
#[derive(Default)]
pub struct StaticDataSource {
    responses: HashMap<String, Response>,
    queries: Mutex<Vec<String>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl StaticDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, query: &str, response: Response) -> Self {
        self.responses.insert(query.trim().to_string(), response);
        self
    }

    pub fn row(self, query: &str, fields: &[(&str, FieldValue)]) -> Self {
        self.respond(query, Response::Row(row(fields)))
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

pub fn row(fields: &[(&str, FieldValue)]) -> FetchedRow {
    fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn fetch(&self, ctx: &RunContext, query: &str) -> Result<FetchedRow, DataSourceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DataSourceError::Closed);
        }
        // Recorded exactly as received.
        self.queries.lock().unwrap().push(query.to_string());
        let query = query.trim();
        if query.is_empty() {
            return Err(DataSourceError::EmptyQuery);
        }

        match self.responses.get(query) {
            Some(Response::Row(fields)) => Ok(fields.clone()),
            Some(Response::NoRows) => Err(DataSourceError::NoRows),
            Some(Response::MultipleRows) => Err(DataSourceError::MultipleRows),
            Some(Response::Fail(message)) => {
                Err(DataSourceError::Query(sqlx::Error::Protocol(message.to_string())))
            }
            Some(Response::Hang) => {
                ctx.run(std::future::pending::<()>()).await?;
                Err(DataSourceError::NoRows)
            }
            None => Err(DataSourceError::Query(sqlx::Error::Protocol(format!(
                "unexpected query: {query}"
            )))),
        }
    }

    async fn close(&self) -> Result<(), DataSourceError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Workbook fake that records every typed write.
#[derive(Default)]
pub struct RecordingWorkbook {
    sheets: IndexMap<String, Vec<Vec<String>>>,
    writes: Vec<(String, String, CellValue)>,
    failing_addresses: HashSet<String>,
    fail_refresh: bool,
    fail_save: bool,
    pub refreshed: bool,
    pub saved: bool,
    pub closed: bool,
}

impl RecordingWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(mut self, name: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|cells| cells.iter().map(|c| c.to_string()).collect())
            .collect();
        self.sheets.insert(name.to_string(), rows);
        self
    }

    /// Make writes to `address` fail on every sheet.
    pub fn fail_writes_to(mut self, address: &str) -> Self {
        self.failing_addresses.insert(address.to_string());
        self
    }

    pub fn fail_refresh(mut self) -> Self {
        self.fail_refresh = true;
        self
    }

    pub fn fail_save(mut self) -> Self {
        self.fail_save = true;
        self
    }

    pub fn writes(&self) -> &[(String, String, CellValue)] {
        &self.writes
    }

    /// The last value written to `address` on `sheet`.
    pub fn written(&self, sheet: &str, address: &str) -> Option<&CellValue> {
        self.writes
            .iter()
            .rev()
            .find(|(s, a, _)| s == sheet && a == address)
            .map(|(_, _, value)| value)
    }
}

impl Workbook for RecordingWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.keys().cloned().collect()
    }

    fn rows(&self, sheet: &str) -> Result<Vec<Vec<String>>, WorkbookError> {
        self.sheets
            .get(sheet)
            .cloned()
            .ok_or_else(|| WorkbookError::SheetNotFound(sheet.to_string()))
    }

    fn set_cell(
        &mut self,
        sheet: &str,
        address: &str,
        value: CellValue,
    ) -> Result<(), WorkbookError> {
        if self.failing_addresses.contains(address) {
            return Err(WorkbookError::InvalidAddress(address.to_string()));
        }
        self.writes
            .push((sheet.to_string(), address.to_string(), value));
        Ok(())
    }

    fn refresh_linked_values(&mut self) -> Result<(), WorkbookError> {
        if self.fail_refresh {
            return Err(WorkbookError::Write {
                path: PathBuf::from("recording.xlsx"),
                message: "refresh failed".into(),
            });
        }
        self.refreshed = true;
        Ok(())
    }

    fn save(&mut self) -> Result<(), WorkbookError> {
        if self.fail_save {
            return Err(WorkbookError::Write {
                path: PathBuf::from("recording.xlsx"),
                message: "disk full".into(),
            });
        }
        self.saved = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), WorkbookError> {
        self.closed = true;
        Ok(())
    }
}
