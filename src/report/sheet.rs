use super::{ReportGenerator, ReportSummary};
use crate::context::RunContext;
use crate::errors::SheetError;
use crate::workbook::Workbook;
use std::path::Path;
use tracing::Instrument;

impl ReportGenerator {
    /// Process every row of one sheet in order, stopping at the first row error.
    ///
    /// Cancellation is checked before each row.
    pub async fn process_sheet(
        &self,
        ctx: &RunContext,
        workbook: &mut dyn Workbook,
        sheet: &str,
        ref_column: usize,
        queries_dir: &Path,
    ) -> Result<ReportSummary, SheetError> {
        let rows = workbook.rows(sheet).map_err(SheetError::ReadRows)?;
        let mut summary = ReportSummary::default();
        if rows.is_empty() {
            tracing::info!("sheet is empty, skipping");
            return Ok(summary);
        }

        for (index, cells) in rows.iter().enumerate() {
            let row = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if let Some(reason) = ctx.err() {
                tracing::warn!(row, reason = %reason, "processing interrupted");
                return Err(SheetError::Interrupted {
                    row,
                    source: reason,
                });
            }

            let reference = cells.get(ref_column).map(|c| c.trim()).unwrap_or_default();
            let span = tracing::info_span!("row", row, reference);
            let outcome = self
                .process_row(ctx, workbook, sheet, row, cells, ref_column, queries_dir)
                .instrument(span)
                .await
                .map_err(|source| SheetError::Row { row, source })?;
            summary.record(outcome);
        }

        Ok(summary)
    }
}
