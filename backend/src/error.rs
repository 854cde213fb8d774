use actix_web::{http::StatusCode, ResponseError};
use thiserror::Error;

/// Everything that can go wrong while serving a device.
///
/// The device cannot act on the distinction, so at the HTTP boundary all
/// variants except `MalformedPayload` collapse into the same "reset
/// firmware" answer. The detail only reaches the server log.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("required header `{0}` is missing")]
    MissingIdentity(&'static str),

    #[error("no device registered for {0}")]
    UnknownDevice(String),

    #[error("access token does not belong to device {0}")]
    CredentialMismatch(String),

    #[error("device store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("malformed telemetry payload: {0}")]
    MalformedPayload(String),
}

impl From<diesel::result::Error> for DeviceError {
    fn from(err: diesel::result::Error) -> Self {
        DeviceError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for DeviceError {
    fn from(err: serde_json::Error) -> Self {
        DeviceError::MalformedPayload(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for DeviceError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        DeviceError::StoreUnavailable("database lock poisoned".to_string())
    }
}

// Only the admin endpoints answer with real status codes; device endpoints
// always map errors into a 200 body.
impl ResponseError for DeviceError {
    fn status_code(&self) -> StatusCode {
        match self {
            DeviceError::MissingIdentity(_) | DeviceError::MalformedPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            DeviceError::UnknownDevice(_) => StatusCode::NOT_FOUND,
            DeviceError::CredentialMismatch(_) => StatusCode::UNAUTHORIZED,
            DeviceError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
