//! Maps `ctxmem_types::Error` onto an HTTP response per spec.md §7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ctxmem_types::{Error, ErrorKind};
use serde::Serialize;

#[derive(Debug)]
pub struct ApiError(pub Error);

#[derive(Serialize)]
struct ErrorBody {
    errmsg: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<ctxmem_store::Error> for ApiError {
    fn from(err: ctxmem_store::Error) -> Self {
        Self(err.into())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::BadRequest | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::LlmError | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { errmsg: self.0.message })).into_response()
    }
}
