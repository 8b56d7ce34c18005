//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::image_store::ImageStoreError;
use crate::models::ErrorBody;
use crate::processor::ProcessError;
use crate::store::StoreError;

pub const DETAIL_NOT_AN_IMAGE: &str = "File must be an image";
pub const DETAIL_UNSUPPORTED_DOCUMENT: &str = "Unsupported document type";
pub const DETAIL_NOT_RECOGNIZED: &str = "Document not recognized";

/// Error returned by handlers, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn processing(reason: impl std::fmt::Display) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error processing document: {reason}"),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

impl From<ProcessError> for ApiError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::UnsupportedDocumentType(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, DETAIL_UNSUPPORTED_DOCUMENT)
            }
            ProcessError::DocumentNotRecognized => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, DETAIL_NOT_RECOGNIZED)
            }
            ProcessError::Analysis(e) => Self::processing(format!("{e:#}")),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<ImageStoreError> for ApiError {
    fn from(err: ImageStoreError) -> Self {
        match err {
            ImageStoreError::InvalidKey(_) => Self::bad_request(err.to_string()),
            other => Self::processing(other),
        }
    }
}
