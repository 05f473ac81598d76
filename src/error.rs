use serde::Serialize;

/// Dataset-level failures. These reach the caller of the ingestion pipeline,
/// which degrades the affected feature instead of failing the map.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    #[error("tabular source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },
    #[error("dataset '{source_id}' has {rows} row(s), need a header and at least one data row")]
    EmptyDataset { source_id: String, rows: usize },
    #[error("no access key configured for the tabular source")]
    MissingAccessKey,
}

impl IngestError {
    pub fn unavailable(source_id: &str, reason: impl ToString) -> Self {
        IngestError::SourceUnavailable {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Why a single row was dropped. Never fails the batch.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RejectReason {
    #[error("coordinate cell '{cell}' is not two comma-separated finite numbers")]
    MalformedCoordinates { cell: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowRejection {
    /// 1-based sheet row, header included.
    pub row: usize,
    pub reason: RejectReason,
}
