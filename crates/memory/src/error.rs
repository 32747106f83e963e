use crate::types::Layer;

pub type Result<T, E = MemoryError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The embedding endpoint failed, timed out, or returned garbage.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    /// A stored row could not be decoded into its tier's record type.
    #[error("malformed {layer} record {id}: {reason}")]
    MalformedRecord {
        layer: Layer,
        id: String,
        reason: String,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search cancelled")]
    Cancelled,

    #[error("invalid time range: start {start} is after end {end}")]
    InvalidTimeRange { start: i64, end: i64 },
}

impl MemoryError {
    pub(crate) fn malformed(layer: Layer, id: impl ToString, reason: impl ToString) -> Self {
        Self::MalformedRecord {
            layer,
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}
