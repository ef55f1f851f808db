//! HTTP error responses for the web adapter.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::domain::error::{ErrorKind, StsError};

use super::envelope::Envelope;

#[derive(Debug)]
pub struct ApiError(pub StsError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_from_error(&self.0)
    }
}

impl From<StsError> for ApiError {
    fn from(err: StsError) -> Self {
        Self(err)
    }
}

pub fn status_from_error(err: &StsError) -> StatusCode {
    match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Persistence | ErrorKind::Config | ErrorKind::Io => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            warn!(error = %self.0, status = status.as_u16(), "request rejected");
        }
        (status, Json(Envelope::failure(&self.0))).into_response()
    }
}
