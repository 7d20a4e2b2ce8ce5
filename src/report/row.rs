use super::ReportGenerator;
use crate::config::FetchErrorPolicy;
use crate::context::RunContext;
use crate::encode::encode;
use crate::errors::{DataSourceError, RowError};
use crate::placeholder::contains_marker;
use crate::value::CellValue;
use crate::workbook::Workbook;
use crate::workbook::address::address_for_index;
use std::io;
use std::path::{Component, Path, PathBuf};

/// What happened to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// The reference cell is absent or blank.
    NoReference,
    /// A reference was consumed but nothing was substituted.
    Skipped(SkipReason),
    /// Placeholders were resolved. `unchanged` counts cells left as-is
    /// because resolving or writing them failed.
    Filled { written: usize, unchanged: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyQuery,
    NoRows,
    EmptyResult,
    FetchFailed,
}

impl ReportGenerator {
    /// Fill one row from the query its reference cell names.
    ///
    /// `row_number` is 1-based and `ref_column` is a zero-based index into
    /// `cells`. The reference cell is cleared as soon as a reference is found.
    #[allow(clippy::too_many_arguments)]
    pub async fn process_row(
        &self,
        ctx: &RunContext,
        workbook: &mut dyn Workbook,
        sheet: &str,
        row_number: u32,
        cells: &[String],
        ref_column: usize,
        queries_dir: &Path,
    ) -> Result<RowOutcome, RowError> {
        let Some(reference) = cells
            .get(ref_column)
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
        else {
            return Ok(RowOutcome::NoReference);
        };

        let query_path = clean_path(&queries_dir.join(reference));
        tracing::info!(reference, path = %query_path.display(), "found query reference");

        match address_for_index(ref_column, row_number) {
            Ok(address) => {
                if let Err(err) = workbook.set_cell(sheet, &address, CellValue::Empty) {
                    tracing::warn!(cell = %address, error = %err, "failed to clear reference cell, continuing");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to address reference cell, continuing");
            }
        }

        let query = match tokio::fs::read_to_string(&query_path).await {
            Ok(query) => query,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(RowError::QueryFileNotFound(query_path));
            }
            Err(source) => {
                return Err(RowError::ReadQuery {
                    path: query_path,
                    source,
                });
            }
        };

        let query = query.trim();
        if query.is_empty() {
            tracing::warn!(path = %query_path.display(), "query file is empty, skipping row");
            return Ok(RowOutcome::Skipped(SkipReason::EmptyQuery));
        }

        let fields = match self.data_source().fetch(ctx, query).await {
            Ok(fields) => fields,
            Err(DataSourceError::NoRows) => {
                tracing::warn!("query returned no rows, skipping replacements for this row");
                return Ok(RowOutcome::Skipped(SkipReason::NoRows));
            }
            Err(err @ DataSourceError::Interrupted(_)) => {
                return Err(RowError::Fetch {
                    path: query_path,
                    source: err,
                });
            }
            Err(err) => match self.config().fetch_error_policy {
                FetchErrorPolicy::Fail => {
                    return Err(RowError::Fetch {
                        path: query_path,
                        source: err,
                    });
                }
                FetchErrorPolicy::Skip => {
                    tracing::warn!(error = %err, path = %query_path.display(), "fetch failed, skipping row");
                    return Ok(RowOutcome::Skipped(SkipReason::FetchFailed));
                }
            },
        };

        if fields.is_empty() {
            tracing::warn!("fetched row has no fields, skipping replacements");
            return Ok(RowOutcome::Skipped(SkipReason::EmptyResult));
        }

        let mut written = 0;
        let mut unchanged = 0;
        for (index, text) in cells.iter().enumerate() {
            if index == ref_column || !contains_marker(text) {
                continue;
            }
            let address = match address_for_index(index, row_number) {
                Ok(address) => address,
                Err(err) => {
                    tracing::warn!(error = %err, "cell is outside the addressable range");
                    unchanged += 1;
                    continue;
                }
            };

            let resolved = match self.resolver().resolve(text, &fields) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(cell = %address, error = %err, "failed to resolve placeholder, keeping original text");
                    unchanged += 1;
                    continue;
                }
            };

            let encoded = encode(&resolved).map_err(|source| RowError::Encode {
                cell: address.clone(),
                source,
            })?;
            if encoded.to_string() == *text {
                continue;
            }

            tracing::debug!(cell = %address, value = %encoded, "writing resolved value");
            match workbook.set_cell(sheet, &address, encoded) {
                Ok(()) => written += 1,
                Err(err) => {
                    tracing::warn!(cell = %address, error = %err, "failed to write resolved value");
                    unchanged += 1;
                }
            }
        }

        tracing::info!(written, unchanged, "finished processing row");
        Ok(RowOutcome::Filled { written, unchanged })
    }
}

/// Lexically normalize a path: drop `.` segments and fold `..` into its parent.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
