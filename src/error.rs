use thiserror::Error;

/// Domain error type for the detection engine (§7).
///
/// `ParsingError` and `QueueStopped` from §7 are deliberately absent here —
/// both are folded into a `ProbeOutcome` value at the probe boundary and
/// never propagate as a Rust `Err` (see `probe::executor::ProbeExecutor::probe`).
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("request timed out after {0}ms")]
    TransportTimeout(u64),

    #[error("upstream unreachable: {0}")]
    TransportUnreachable(String),

    #[error("upstream returned HTTP {status}: {body}")]
    UpstreamHttpError { status: u16, body: String },

    #[error("hidden error in response body: {0}")]
    HiddenBodyError(String),

    #[error("scheduler config unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("coordination store error: {0}")]
    CoordinationStoreError(String),

    #[error("model sync failed for all keys: {0}")]
    SyncUpstreamError(String),

    #[error("no models discovered for channel")]
    ModelFetchFailed,

    #[error("invalid schedule expression: {0}")]
    InvalidSchedule(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Other(String),
}

impl DetectError {
    /// Stable machine-readable code for the `{error, code}` HTTP envelope (§6).
    pub fn code(&self) -> &'static str {
        match self {
            DetectError::TransportTimeout(_)
            | DetectError::TransportUnreachable(_)
            | DetectError::UpstreamHttpError { .. }
            | DetectError::HiddenBodyError(_) => "FETCH_ERROR",
            DetectError::ConfigUnavailable(_) => "CONFIG_ERROR",
            DetectError::CoordinationStoreError(_) => "QUEUE_ERROR",
            DetectError::SyncUpstreamError(_) => "SYNC_ERROR",
            DetectError::ModelFetchFailed => "MODEL_FETCH_FAILED",
            DetectError::InvalidSchedule(_) => "VALIDATION_ERROR",
            DetectError::Validation(_) => "VALIDATION_ERROR",
            DetectError::Other(_) => "SYNC_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            DetectError::ModelFetchFailed | DetectError::Validation(_) | DetectError::InvalidSchedule(_) => 400,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectError>;
