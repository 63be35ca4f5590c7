use sea_orm::DbErr;
use vigil_common::duration::DurationError;
use vigil_common::iprange::IpRangeError;

/// Errors returned by alert ingestion, querying, deletion and retention.
///
/// Every variant names the offending field or entity and keeps the
/// underlying cause as its `source`.
///
/// # Examples
///
/// ```rust
/// use vigil_storage::error::StoreError;
///
/// let err = StoreError::InvalidFilter {
///     key: "severity".to_string(),
///     value: "high".to_string(),
/// };
/// assert!(err.to_string().contains("severity"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An instant was not in RFC 3339 format.
    #[error("Store: unable to parse {field} time '{value}': {source}")]
    ParseTimeFail {
        field: &'static str,
        value: String,
        source: chrono::ParseError,
    },

    /// A duration did not follow the duration grammar, or overflowed when
    /// applied to the current time.
    #[error("Store: unable to parse {field} duration '{value}': {source}")]
    ParseDurationFail {
        field: &'static str,
        value: String,
        source: DurationError,
    },

    /// A filter value could not be read as the type its key requires.
    #[error("Store: '{value}' is not a {expected} (filter '{field}')")]
    ParseType {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    /// Event metadata could not be serialized.
    #[error("Store: unable to serialize {field}: {source}")]
    MarshalFail {
        field: &'static str,
        source: serde_json::Error,
    },

    /// A batch flush failed; the batch was rolled back.
    #[error("Store: bulk write failed while {context}: {source}")]
    BulkError { context: &'static str, source: DbErr },

    /// A read, or the reporting machine lookup, failed.
    #[error("Store: query failed ({context}): {source}")]
    QueryFail {
        context: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// One step of an alert's cascading delete failed.
    #[error("Store: unable to delete {entity} of alert '{alert_id}': {source}")]
    DeleteFail {
        entity: &'static str,
        alert_id: String,
        source: DbErr,
    },

    #[error("Store: invalid IP or range for {field} '{value}': {source}")]
    InvalidIpOrRange {
        field: &'static str,
        value: String,
        source: IpRangeError,
    },

    /// The filter key is not part of the filter vocabulary, or has no value.
    #[error("Store: filter parameter '{key}' is unknown or empty (={value})")]
    InvalidFilter { key: String, value: String },

    /// The cancellation token fired before the next unit of work started.
    #[error("Store: cancelled after {completed} completed item(s)")]
    Cancelled { completed: usize },

    #[error("Store: database error: {0}")]
    Database(#[from] DbErr),
}

impl StoreError {
    pub(crate) fn query(context: impl Into<String>, source: DbErr) -> Self {
        Self::QueryFail {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Convenience `Result` alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
