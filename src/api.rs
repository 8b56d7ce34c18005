//! HTTP routes of the intake server.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{ApiError, DETAIL_NOT_AN_IMAGE};
use crate::image_store::{content_type_for, ImageStore};
use crate::models::{Envelope, ProcessResponse, ReviewDocument, ReviewUpdate};
use crate::processor::{self, DocumentAnalyzer};
use crate::store::{DocumentFilter, DocumentRecord, DocumentStore};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub documents: DocumentStore,
    pub images: ImageStore,
    pub analyzer: Arc<dyn DocumentAnalyzer>,
    pub max_upload_bytes: usize,
}

/// Build the router. CORS and request tracing are layered on by the caller.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    let api = Router::new()
        .route("/process", post(process_document))
        .route("/documents", get(list_documents).put(update_document))
        .route("/documents/:id", get(get_document))
        .route("/documents-to-review", get(documents_to_review))
        .route("/images/*key", get(get_image));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "ID document intake API. Upload images to /api/process."
    }))
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Upload an ID image, classify it and extract its fields.
async fn process_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ProcessResponse>, ApiError> {
    let mut file_name: Option<String> = None;
    let mut file_data = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(ApiError::bad_request(DETAIL_NOT_AN_IMAGE));
        }

        file_name = field.file_name().map(|s| s.to_string());
        file_data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {}", e)))?
            .to_vec();
        break;
    }

    if file_data.is_empty() {
        return Err(ApiError::bad_request("No file uploaded"));
    }

    info!(
        "Received image: {} ({} bytes)",
        file_name.as_deref().unwrap_or("<unnamed>"),
        file_data.len()
    );

    let processed = processor::process_document(state.analyzer.as_ref(), &file_data)
        .await
        .map_err(|e| {
            error!("Processing failed: {:#}", e);
            ApiError::from(e)
        })?;

    let stored = state
        .images
        .put(processed.document_type.as_str(), file_name.as_deref(), &file_data)
        .await
        .map_err(|e| {
            error!("Failed to store image: {}", e);
            ApiError::processing("Failed to store image")
        })?;

    let content_hash = {
        let mut hasher = Sha256::new();
        hasher.update(&file_data);
        format!("{:x}", hasher.finalize())
    };

    let extracted_data = processed.fields.to_map();
    let needs_manual_review = processed.needs_manual_review();
    let metadata = serde_json::to_value(&processed.metadata).unwrap_or(serde_json::Value::Null);

    let mut record = DocumentRecord::new(processed.document_type.as_str(), extracted_data);
    record.image_key = Some(stored.key);
    record.document_image_url = Some(stored.url);
    record.content_hash = Some(content_hash);
    record.needs_manual_review = needs_manual_review;
    record.metadata = metadata;

    if let Err(e) = state.documents.insert(record.clone()).await {
        error!("Failed to save document {}: {}", record.id, e);
        if let Some(key) = record.image_key.as_deref() {
            if let Err(cleanup) = state.images.delete(key).await {
                warn!("Failed to remove image {} after save error: {}", key, cleanup);
            }
        }
        return Err(e.into());
    }

    info!(
        "Processed document {} as {} (needs review: {})",
        record.id, record.document_type, record.needs_manual_review
    );

    Ok(Json(ProcessResponse {
        document_id: record.id,
        document_type: record.document_type,
        extracted_data: record.extracted_data,
        metadata: record.metadata,
        needs_manual_review: record.needs_manual_review,
        document_image_url: record.document_image_url,
    }))
}

/// List every stored document.
async fn list_documents(State(state): State<AppState>) -> Json<Envelope<Vec<DocumentRecord>>> {
    Json(Envelope::new(
        state.documents.list(DocumentFilter::default()),
        "Documents retrieved successfully",
    ))
}

/// Get one document by id.
async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<DocumentRecord>>, ApiError> {
    state
        .documents
        .get(&id)
        .map(|doc| Json(Envelope::new(doc, "Document retrieved successfully")))
        .ok_or_else(|| ApiError::not_found("Document not found"))
}

/// Documents waiting for manual review, with a viewable image URL.
async fn documents_to_review(
    State(state): State<AppState>,
) -> Json<Envelope<Vec<ReviewDocument>>> {
    let documents = state
        .documents
        .list(DocumentFilter::pending_review())
        .iter()
        .map(|doc| {
            let viewable = doc.image_key.as_deref().map(|key| state.images.url_for(key));
            doc.to_review(viewable)
        })
        .collect();

    Json(Envelope::new(documents, "Documents retrieved successfully"))
}

/// Record a reviewer's approve/reject decision.
async fn update_document(
    State(state): State<AppState>,
    Json(update): Json<ReviewUpdate>,
) -> Result<Json<Envelope<DocumentRecord>>, ApiError> {
    state
        .documents
        .apply_review(&update)
        .await?
        .map(|doc| Json(Envelope::new(doc, "Document updated successfully")))
        .ok_or_else(|| ApiError::not_found("Document not found"))
}

/// Serve a stored document image.
async fn get_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let key = key.trim_start_matches('/');
    match state.images.get(key).await? {
        Some(bytes) => Ok(([(header::CONTENT_TYPE, content_type_for(key))], bytes).into_response()),
        None => Err(ApiError::not_found("Image not found")),
    }
}
