//! HTTP client for the intake API, as used by the capture and review pages.
//!
//! Upload failures are classified into [`UploadError`] here so callers match
//! on a closed set of outcomes instead of comparing status codes and strings.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::capture::{normalize_mime, SelectedFile, OCTET_STREAM};
use crate::error::{DETAIL_NOT_AN_IMAGE, DETAIL_NOT_RECOGNIZED, DETAIL_UNSUPPORTED_DOCUMENT};
use crate::models::{Envelope, ProcessResponse, ReviewDocument, ReviewUpdate};

/// Outcome of a failed document submission.
///
/// `Display` yields the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Please upload a valid image file")]
    InvalidFileType,

    #[error("This type of document is not supported. Please upload a valid ID document.")]
    UnsupportedDocumentType,

    #[error("Unable to recognize the document. Please ensure you're uploading a clear photo of a valid ID")]
    DocumentNotRecognized,

    /// Any other rejection that carried a detail message.
    #[error("{detail}")]
    Rejected { status: u16, detail: String },

    /// A non-success response without a usable detail.
    #[error("Upload failed")]
    Failed { status: u16 },

    /// The request never produced a usable response.
    #[error("An unexpected error occurred while processing your document")]
    Transport(String),
}

impl UploadError {
    /// Map a non-success response to an error kind.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let detail = detail_of(body);

        match (status, detail.as_deref()) {
            (400, Some(DETAIL_NOT_AN_IMAGE)) => Self::InvalidFileType,
            (422, Some(DETAIL_UNSUPPORTED_DOCUMENT)) => Self::UnsupportedDocumentType,
            (422, Some(DETAIL_NOT_RECOGNIZED)) => Self::DocumentNotRecognized,
            (_, Some(detail)) if !detail.is_empty() => Self::Rejected {
                status,
                detail: detail.to_string(),
            },
            _ => Self::Failed { status },
        }
    }

    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

/// Errors from the review endpoints. Surfaced to the reviewer as one string.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {detail}")]
    Status { status: u16, detail: String },
}

/// Submits a selected image for processing.
#[async_trait::async_trait]
pub trait DocumentSubmitter: Send + Sync {
    async fn submit(&self, file: &SelectedFile) -> Result<ProcessResponse, UploadError>;
}

/// Review list and decision endpoints.
#[async_trait::async_trait]
pub trait ReviewApi: Send + Sync {
    async fn pending_documents(&self) -> Result<Vec<ReviewDocument>, ClientError>;
    async fn update_document(&self, update: &ReviewUpdate) -> Result<ReviewDocument, ClientError>;
}

/// reqwest-backed client for the intake API.
#[derive(Clone)]
pub struct IntakeClient {
    client: Client,
    base_url: String,
}

impl IntakeClient {
    /// `base_url` is the API root, e.g. `http://localhost:8000/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// `POST /process` with the file as multipart field `file`.
    pub async fn process(&self, file: &SelectedFile) -> Result<ProcessResponse, UploadError> {
        let build_part = |mime: &str| {
            Part::bytes(file.data.clone())
                .file_name(file.name.clone())
                .mime_str(mime)
        };
        let part = match build_part(normalize_mime(&file.mime_type)) {
            Ok(part) => part,
            Err(e) => {
                debug!("Sending {} as {}: {}", file.name, OCTET_STREAM, e);
                build_part(OCTET_STREAM).map_err(|e| UploadError::Transport(e.to_string()))?
            }
        };
        let form = Form::new().part("file", part);

        debug!("Submitting {} ({} bytes)", file.name, file.data.len());

        let response = self
            .client
            .post(self.url("process"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!("Upload request failed: {}", e);
                UploadError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        if !status.is_success() {
            let err = UploadError::from_response(status.as_u16(), &body);
            warn!("Upload rejected ({}): {:?}", status, err);
            return Err(err);
        }

        serde_json::from_slice(&body).map_err(|e| UploadError::Transport(e.to_string()))
    }

    /// `GET /documents-to-review`.
    pub async fn documents_to_review(&self) -> Result<Vec<ReviewDocument>, ClientError> {
        let response = self.client.get(self.url("documents-to-review")).send().await?;
        let envelope: Envelope<Vec<ReviewDocument>> = Self::json_or_status(response).await?;
        Ok(envelope.data)
    }

    /// `PUT /documents` with a reviewer decision.
    pub async fn update(&self, update: &ReviewUpdate) -> Result<ReviewDocument, ClientError> {
        let response = self
            .client
            .put(self.url("documents"))
            .json(update)
            .send()
            .await?;
        let envelope: Envelope<ReviewDocument> = Self::json_or_status(response).await?;
        Ok(envelope.data)
    }

    async fn json_or_status<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                detail: detail_of(&body).unwrap_or_else(|| status.to_string()),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl DocumentSubmitter for IntakeClient {
    async fn submit(&self, file: &SelectedFile) -> Result<ProcessResponse, UploadError> {
        self.process(file).await
    }
}

#[async_trait::async_trait]
impl ReviewApi for IntakeClient {
    async fn pending_documents(&self) -> Result<Vec<ReviewDocument>, ClientError> {
        self.documents_to_review().await
    }

    async fn update_document(&self, update: &ReviewUpdate) -> Result<ReviewDocument, ClientError> {
        self.update(update).await
    }
}

/// `detail` field of an error body. Non-string details are returned as JSON text.
fn detail_of(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("detail")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
