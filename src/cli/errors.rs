use crate::config::format_duration;
use crate::context::Interrupted;
use crate::errors::ReportError;
use std::time::Duration;

/// Wrap a failed run with the message an operator should see first.
///
/// Timeouts and cancellations are reported distinctly from other failures;
/// the full error chain stays attached underneath.
pub fn describe(err: ReportError, timeout: Duration) -> anyhow::Error {
    let headline = match err.interruption() {
        Some(Interrupted::DeadlineExceeded) => format!(
            "report generation timed out after {}",
            format_duration(timeout)
        ),
        Some(Interrupted::Cancelled) => "report generation cancelled".to_string(),
        None => "report generation failed".to_string(),
    };
    anyhow::Error::new(err).context(headline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn timeouts_and_cancellations_get_distinct_headlines() {
        let timed_out = ReportError::Interrupted {
            sheet: "Summary".into(),
            source: Interrupted::DeadlineExceeded,
        };
        let message = describe(timed_out, Duration::from_secs(300)).to_string();
        assert_eq!(message, "report generation timed out after 5m0s");

        let cancelled = ReportError::Interrupted {
            sheet: "Summary".into(),
            source: Interrupted::Cancelled,
        };
        assert_eq!(
            describe(cancelled, Duration::from_secs(1)).to_string(),
            "report generation cancelled"
        );
    }

    #[test]
    fn other_failures_keep_their_chain() {
        let err = ReportError::EmptyWorkbook(PathBuf::from("/t/empty.xlsx"));
        let described = describe(err, Duration::from_secs(1));
        assert_eq!(described.to_string(), "report generation failed");
        assert!(format!("{described:#}").contains("contains no sheets"));
    }
}
