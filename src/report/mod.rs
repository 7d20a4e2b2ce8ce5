//! Report generation: copy the template, fill every referenced row, save.

mod copy;
mod row;
mod sheet;

pub use copy::{copy_template, copy_template_async};
pub use row::{RowOutcome, SkipReason, clean_path};

use crate::config::ReportConfig;
use crate::context::RunContext;
use crate::datasource::DataSource;
use crate::errors::{ReportError, WorkbookError};
use crate::placeholder::PlaceholderResolver;
use crate::workbook::address::column_index;
use crate::workbook::{UmyaWorkbook, Workbook};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Counters for one generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub sheets: usize,
    pub references: usize,
    pub rows_skipped: usize,
    pub cells_written: usize,
    pub cells_unchanged: usize,
    pub duration: Duration,
}

impl ReportSummary {
    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::NoReference => {}
            RowOutcome::Skipped(_) => {
                self.references += 1;
                self.rows_skipped += 1;
            }
            RowOutcome::Filled { written, unchanged } => {
                self.references += 1;
                self.cells_written += written;
                self.cells_unchanged += unchanged;
            }
        }
    }

    fn absorb(&mut self, sheet: ReportSummary) {
        self.sheets += 1;
        self.references += sheet.references;
        self.rows_skipped += sheet.rows_skipped;
        self.cells_written += sheet.cells_written;
        self.cells_unchanged += sheet.cells_unchanged;
    }
}

pub struct ReportGenerator {
    data_source: Arc<dyn DataSource>,
    config: ReportConfig,
    resolver: PlaceholderResolver,
}

impl ReportGenerator {
    pub fn new(data_source: Arc<dyn DataSource>, config: ReportConfig) -> Self {
        Self::with_resolver(data_source, config, PlaceholderResolver::default())
    }

    pub fn with_resolver(
        data_source: Arc<dyn DataSource>,
        config: ReportConfig,
        resolver: PlaceholderResolver,
    ) -> Self {
        Self {
            data_source,
            config,
            resolver,
        }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub(crate) fn data_source(&self) -> &dyn DataSource {
        self.data_source.as_ref()
    }

    pub(crate) fn resolver(&self) -> &PlaceholderResolver {
        &self.resolver
    }

    /// Produce the output workbook.
    ///
    /// The template is copied to the output path first, so a failed run can
    /// leave a partially filled file behind.
    pub async fn generate(&self, ctx: &RunContext) -> Result<ReportSummary, ReportError> {
        let span = tracing::info_span!(
            "generate",
            template = %self.config.template_path.display(),
            output = %self.config.output_path.display(),
        );
        async {
            let started = Instant::now();
            tracing::info!(
                queries_dir = %self.config.queries_dir.display(),
                ref_column = %self.config.ref_column,
                "starting report generation"
            );

            let template = &self.config.template_path;
            let output = &self.config.output_path;
            let bytes = copy_template_async(template, output)
                .await
                .map_err(|source| ReportError::Copy {
                    from: template.clone(),
                    to: output.clone(),
                    source,
                })?;
            tracing::debug!(bytes, "template copied");

            let mut workbook = open_workbook(output).await?;
            let mut summary = self.fill(ctx, &mut workbook).await?;
            summary.duration = started.elapsed();
            tracing::info!(
                sheets = summary.sheets,
                references = summary.references,
                rows_skipped = summary.rows_skipped,
                cells_written = summary.cells_written,
                cells_unchanged = summary.cells_unchanged,
                duration_ms = summary.duration.as_millis() as u64,
                "report generated"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Fill an already opened copy of the template, refresh it and save it.
    ///
    /// The workbook is closed on every path, including failures.
    pub async fn fill(
        &self,
        ctx: &RunContext,
        workbook: &mut dyn Workbook,
    ) -> Result<ReportSummary, ReportError> {
        let result = self.fill_sheets(ctx, workbook).await;
        if let Err(err) = workbook.close() {
            tracing::warn!(error = %err, "failed to close workbook");
        }
        result
    }

    async fn fill_sheets(
        &self,
        ctx: &RunContext,
        workbook: &mut dyn Workbook,
    ) -> Result<ReportSummary, ReportError> {
        let sheets = workbook.sheet_names();
        if sheets.is_empty() {
            return Err(ReportError::EmptyWorkbook(self.config.template_path.clone()));
        }

        let ref_column = column_index(&self.config.ref_column)
            .map_err(|err| ReportError::InvalidConfiguration(err.to_string()))?;

        let mut summary = ReportSummary::default();
        for (index, sheet) in sheets.iter().enumerate() {
            let span = tracing::info_span!("sheet", name = %sheet, index);
            let sheet_summary = self
                .process_sheet(ctx, workbook, sheet, ref_column, &self.config.queries_dir)
                .instrument(span)
                .await
                .map_err(|source| ReportError::Sheet {
                    sheet: sheet.clone(),
                    source,
                })?;
            tracing::info!(sheet = %sheet, references = sheet_summary.references, "finished sheet");
            summary.absorb(sheet_summary);

            if let Some(reason) = ctx.err() {
                return Err(ReportError::Interrupted {
                    sheet: sheet.clone(),
                    source: reason,
                });
            }
        }

        if let Err(err) = workbook.refresh_linked_values() {
            tracing::warn!(error = %err, "failed to refresh linked values, continuing");
        }

        tracing::info!(path = %self.config.output_path.display(), "saving generated report");
        workbook.save().map_err(|source| ReportError::Save {
            path: self.config.output_path.clone(),
            source,
        })?;
        Ok(summary)
    }
}

async fn open_workbook(path: &std::path::Path) -> Result<UmyaWorkbook, ReportError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || UmyaWorkbook::open(&owned))
        .await
        .map_err(|err| WorkbookError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
        .and_then(|opened| opened)
        .map_err(|source| ReportError::Open {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_outcomes() {
        let mut summary = ReportSummary::default();
        summary.record(RowOutcome::NoReference);
        summary.record(RowOutcome::Skipped(SkipReason::NoRows));
        summary.record(RowOutcome::Filled {
            written: 3,
            unchanged: 1,
        });
        assert_eq!(summary.references, 2);
        assert_eq!(summary.rows_skipped, 1);
        assert_eq!(summary.cells_written, 3);
        assert_eq!(summary.cells_unchanged, 1);

        let mut total = ReportSummary::default();
        total.absorb(summary);
        assert_eq!(total.sheets, 1);
        assert_eq!(total.cells_written, 3);
    }
}
