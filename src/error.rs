use thiserror::Error;
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("sample rate must be a finite value greater than zero")]
    InvalidSampleRate,
    #[error("{what} must be greater than zero")]
    ZeroCapacity { what: &'static str },
    #[error("event is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("unknown event kind `{0}`")]
    UnknownEvent(String),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("monitor worker is not running")]
    WorkerStopped,
    #[error("profile rejected: {0}")]
    InvalidProfile(String),
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl MonitorError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        MonitorError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for MonitorError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        MonitorError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for MonitorError {
    fn from(value: image::ImageError) -> Self {
        MonitorError::Plot(value.to_string())
    }
}
