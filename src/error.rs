use chrono::NaiveDateTime;
use thiserror::Error;

use crate::source::SourceError;

/// Error taxonomy for a reporting run.
///
/// Period/spec errors are recovered at request granularity,
/// source-access errors abort the whole aggregation, and per-event
/// parse failures never surface here (the aggregator skips the event
/// and counts it in its diagnostics).
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("無効な期間指定です: {literal}（YYYY-MM / this / last / -N / all）")]
    InvalidPeriodSpec { literal: String },

    #[error("期間の開始が終了以降になっています: {start} >= {end}")]
    InvalidRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("チャンネル {source_id} の履歴を読む権限がありません。")]
    SourceUnreadable { source_id: String },

    #[error("イベントソースの読み込みに失敗しました")]
    Source(#[from] SourceError),

    #[error("レポートの書き出しに失敗しました")]
    Csv(#[from] csv::Error),

    #[error("レポートの書き出しに失敗しました")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    /// Collapse a stream-level source failure into the run-fatal
    /// taxonomy: permission denial becomes `SourceUnreadable` with the
    /// offending source id attached.
    pub fn from_source(err: SourceError) -> Self {
        match err {
            SourceError::Forbidden { source_id } => ReportError::SourceUnreadable { source_id },
            other => ReportError::Source(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_source_maps_to_source_unreadable() {
        let err = ReportError::from_source(SourceError::Forbidden {
            source_id: "lunch".to_string(),
        });
        assert!(matches!(
            err,
            ReportError::SourceUnreadable { ref source_id } if source_id == "lunch"
        ));
    }

    #[test]
    fn abort_messages_are_distinguishable() {
        let invalid = ReportError::InvalidPeriodSpec {
            literal: "2024-13".to_string(),
        }
        .to_string();
        let unreadable = ReportError::SourceUnreadable {
            source_id: "general".to_string(),
        }
        .to_string();

        assert!(invalid.contains("2024-13"));
        assert!(unreadable.contains("general"));
        assert_ne!(invalid, unreadable);
    }
}
