//! Manual review page state.
//!
//! Lists documents waiting for review, shows the selected one next to its
//! extracted fields and records approve/reject decisions. Each decision is
//! followed by a reload of the list and a cleared selection.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::ReviewApi;
use crate::models::{ReviewDocument, ReviewUpdate};

pub const PLACEHOLDER_IMAGE: &str = "/placeholder.png";

/// One extracted field ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedField {
    pub name: String,
    pub value: String,
}

/// The detail panel for the selected document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDetail {
    pub id: String,
    pub document_type: String,
    pub image_url: String,
    pub fields: Vec<RenderedField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn update_for(self, id: &str) -> ReviewUpdate {
        match self {
            Self::Approve => ReviewUpdate::approve(id),
            Self::Reject => ReviewUpdate::reject(id),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReviewSession {
    documents: Vec<ReviewDocument>,
    selected: Option<String>,
    loading: bool,
    error: Option<String>,
    generation: u64,
}

/// Ticket for an in-flight list request. Only the newest one is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

impl ReviewSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a list request as started.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        self.loading = true;
        LoadTicket(self.generation)
    }

    /// Apply a list result. Returns false for a stale ticket.
    pub fn finish_load<E: std::fmt::Display>(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<ReviewDocument>, E>,
    ) -> bool {
        if ticket.0 != self.generation {
            debug!("Discarding stale review list (ticket {}, current {})", ticket.0, self.generation);
            return false;
        }
        self.loading = false;

        match result {
            Ok(documents) => {
                debug!("Loaded {} documents for review", documents.len());
                self.documents = documents;
                self.error = None;
                if let Some(id) = &self.selected {
                    if !self.documents.iter().any(|d| &d.id == id) {
                        self.selected = None;
                    }
                }
            }
            Err(e) => {
                warn!("Error fetching documents: {}", e);
                self.error = Some(e.to_string());
            }
        }
        true
    }

    /// Initial fetch when the page opens.
    pub async fn load(&mut self, api: &dyn ReviewApi) {
        self.refresh(api).await;
    }

    /// Fetch the pending documents.
    pub async fn refresh(&mut self, api: &dyn ReviewApi) {
        let ticket = self.begin_load();
        let result = api.pending_documents().await;
        self.finish_load(ticket, result);
    }

    /// Select a document by id. Unknown ids clear the selection.
    pub fn select(&mut self, id: &str) {
        self.selected = self
            .documents
            .iter()
            .any(|d| d.id == id)
            .then(|| id.to_string());
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn documents(&self) -> &[ReviewDocument] {
        &self.documents
    }

    pub fn selected(&self) -> Option<&ReviewDocument> {
        let id = self.selected.as_deref()?;
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Detail panel for the selected document.
    pub fn detail(&self) -> Option<DocumentDetail> {
        self.selected().map(detail_of)
    }

    pub async fn approve(&mut self, api: &dyn ReviewApi) {
        self.decide(api, Decision::Approve).await;
    }

    pub async fn reject(&mut self, api: &dyn ReviewApi) {
        self.decide(api, Decision::Reject).await;
    }

    /// Send a decision for the selected document, then reload and deselect.
    /// Does nothing without a selection.
    pub async fn decide(&mut self, api: &dyn ReviewApi, decision: Decision) {
        let Some(id) = self.selected.clone() else {
            return;
        };

        let update_error = match api.update_document(&decision.update_for(&id)).await {
            Ok(_) => {
                info!("Recorded {:?} for document {}", decision, id);
                None
            }
            Err(e) => {
                warn!("Error updating document {}: {}", id, e);
                Some(e.to_string())
            }
        };

        self.refresh(api).await;
        self.selected = None;
        if update_error.is_some() {
            self.error = update_error;
        }
    }
}

fn detail_of(doc: &ReviewDocument) -> DocumentDetail {
    let image_url = non_empty(&doc.viewable_url)
        .or_else(|| non_empty(&doc.document_image_url))
        .unwrap_or(PLACEHOLDER_IMAGE)
        .to_string();

    let fields = doc
        .extracted_data
        .iter()
        .map(|(name, value)| RenderedField {
            name: name.clone(),
            value: render_field_value(value),
        })
        .collect();

    DocumentDetail {
        id: doc.id.clone(),
        document_type: doc.document_type.clone(),
        image_url,
        fields,
    }
}

fn non_empty(url: &Option<String>) -> Option<&str> {
    url.as_deref().filter(|u| !u.trim().is_empty())
}

/// Display text for an extracted value. Objects and arrays are pretty-printed
/// JSON, strings are shown as-is.
pub fn render_field_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use serde_json::{json, Map};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeReviewApi {
        documents: Mutex<Vec<ReviewDocument>>,
        updates: Mutex<Vec<ReviewUpdate>>,
        fail_updates: bool,
    }

    #[async_trait::async_trait]
    impl ReviewApi for FakeReviewApi {
        async fn pending_documents(&self) -> Result<Vec<ReviewDocument>, ClientError> {
            Ok(self.documents.lock().unwrap().clone())
        }

        async fn update_document(
            &self,
            update: &ReviewUpdate,
        ) -> Result<ReviewDocument, ClientError> {
            self.updates.lock().unwrap().push(update.clone());
            if self.fail_updates {
                return Err(ClientError::Status {
                    status: 500,
                    detail: "database unavailable".into(),
                });
            }
            let mut docs = self.documents.lock().unwrap();
            let pos = docs.iter().position(|d| d.id == update.id).ok_or(ClientError::Status {
                status: 404,
                detail: "Document not found".into(),
            })?;
            let mut doc = docs.remove(pos);
            doc.manual_review_completed = true;
            doc.needs_manual_review = false;
            doc.rejected = update.rejected.unwrap_or(false);
            Ok(doc)
        }
    }

    fn doc(id: &str) -> ReviewDocument {
        let mut data = Map::new();
        data.insert(
            "surname".into(),
            json!({"visible": true, "value": "DOE", "confidence": "unsure"}),
        );
        ReviewDocument {
            id: id.into(),
            document_type: "american_passport".into(),
            extracted_data: data,
            document_image_url: Some(format!("http://files/{id}.jpg")),
            viewable_url: None,
            needs_manual_review: true,
            manual_review_completed: false,
            rejected: false,
        }
    }

    fn api_with(ids: &[&str]) -> FakeReviewApi {
        FakeReviewApi {
            documents: Mutex::new(ids.iter().map(|id| doc(id)).collect()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_refresh_and_select() {
        let api = api_with(&["a", "b"]);
        let mut session = ReviewSession::new();
        session.load(&api).await;

        assert!(!session.is_loading());
        assert_eq!(session.documents().len(), 2);
        assert!(session.selected().is_none());

        session.select("b");
        assert_eq!(session.selected().unwrap().id, "b");

        session.select("missing");
        assert!(session.selected().is_none());
    }

    #[tokio::test]
    async fn test_approve_sends_update_and_clears_selection() {
        let api = api_with(&["a", "b"]);
        let mut session = ReviewSession::new();
        session.refresh(&api).await;
        session.select("a");

        session.approve(&api).await;

        assert_eq!(api.updates.lock().unwrap().as_slice(), &[ReviewUpdate::approve("a")]);
        assert!(session.selected().is_none());
        let ids: Vec<_> = session.documents().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_reject_sets_rejected_flag() {
        let api = api_with(&["a"]);
        let mut session = ReviewSession::new();
        session.refresh(&api).await;
        session.select("a");

        session.reject(&api).await;

        let updates = api.updates.lock().unwrap();
        assert_eq!(updates[0].rejected, Some(true));
        assert!(session.documents().is_empty());
    }

    #[tokio::test]
    async fn test_decision_without_selection_is_noop() {
        let api = api_with(&["a"]);
        let mut session = ReviewSession::new();
        session.refresh(&api).await;
        session.approve(&api).await;
        assert!(api.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_update_still_refreshes() {
        let api = FakeReviewApi {
            fail_updates: true,
            ..api_with(&["a"])
        };
        let mut session = ReviewSession::new();
        session.refresh(&api).await;
        session.select("a");

        session.approve(&api).await;

        assert!(session.selected().is_none());
        assert_eq!(session.documents().len(), 1);
        assert!(session.error_message().unwrap().contains("database unavailable"));
    }

    #[test]
    fn test_stale_list_is_discarded() {
        let mut session = ReviewSession::new();
        let stale = session.begin_load();
        let current = session.begin_load();

        assert!(session.finish_load::<ClientError>(current, Ok(vec![doc("new")])));
        assert!(!session.finish_load::<ClientError>(stale, Ok(vec![doc("old")])));
        assert_eq!(session.documents()[0].id, "new");
    }

    #[test]
    fn test_selection_dropped_when_document_leaves_list() {
        let mut session = ReviewSession::new();
        let t = session.begin_load();
        session.finish_load::<ClientError>(t, Ok(vec![doc("a"), doc("b")]));
        session.select("a");

        let t = session.begin_load();
        session.finish_load::<ClientError>(t, Ok(vec![doc("b")]));
        assert!(session.selected().is_none());
    }

    #[test]
    fn test_detail_image_fallbacks() {
        let mut d = doc("a");
        d.viewable_url = Some("http://api/images/a.jpg".into());
        assert_eq!(detail_of(&d).image_url, "http://api/images/a.jpg");

        d.viewable_url = Some(String::new());
        assert_eq!(detail_of(&d).image_url, "http://files/a.jpg");

        d.viewable_url = None;
        assert_eq!(detail_of(&d).image_url, "http://files/a.jpg");

        d.document_image_url = Some(" ".into());
        assert_eq!(detail_of(&d).image_url, PLACEHOLDER_IMAGE);

        d.document_image_url = None;
        assert_eq!(detail_of(&d).image_url, PLACEHOLDER_IMAGE);
    }

    #[test]
    fn test_detail_fields() {
        let detail = detail_of(&doc("a"));
        assert_eq!(detail.fields.len(), 1);
        assert_eq!(detail.fields[0].name, "surname");
        assert!(detail.fields[0].value.contains("\"value\": \"DOE\""));
    }

    #[test]
    fn test_render_field_value() {
        assert_eq!(render_field_value(&json!("DOE")), "DOE");
        assert_eq!(render_field_value(&json!(42)), "42");
        assert_eq!(render_field_value(&json!(true)), "true");
        assert_eq!(render_field_value(&Value::Null), "null");
        assert_eq!(render_field_value(&json!({"a": 1})), "{\n  \"a\": 1\n}");
    }
}
