//! Document record store.
//!
//! Records live in memory behind a `RwLock`. When a snapshot path is
//! configured every mutation rewrites the snapshot, and `open` reloads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{ReviewDocument, ReviewUpdate};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to access document snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document snapshot {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub document_type: String,
    pub extracted_data: Map<String, Value>,
    #[serde(default)]
    pub image_key: Option<String>,
    #[serde(default)]
    pub document_image_url: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    pub needs_manual_review: bool,
    #[serde(default)]
    pub manual_review_completed: bool,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(document_type: impl Into<String>, extracted_data: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().simple().to_string(),
            document_type: document_type.into(),
            extracted_data,
            image_key: None,
            document_image_url: None,
            content_hash: None,
            needs_manual_review: false,
            manual_review_completed: false,
            rejected: false,
            metadata: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Review view of the record, with a resolved image URL.
    pub fn to_review(&self, viewable_url: Option<String>) -> ReviewDocument {
        ReviewDocument {
            id: self.id.clone(),
            document_type: self.document_type.clone(),
            extracted_data: self.extracted_data.clone(),
            document_image_url: self.document_image_url.clone(),
            viewable_url,
            needs_manual_review: self.needs_manual_review,
            manual_review_completed: self.manual_review_completed,
            rejected: self.rejected,
        }
    }
}

/// Query filter for [`DocumentStore::list`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentFilter {
    pub needs_manual_review: Option<bool>,
}

impl DocumentFilter {
    pub fn pending_review() -> Self {
        Self {
            needs_manual_review: Some(true),
        }
    }

    fn matches(&self, record: &DocumentRecord) -> bool {
        self.needs_manual_review
            .map_or(true, |flag| record.needs_manual_review == flag)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    inner: Arc<RwLock<HashMap<String, DocumentRecord>>>,
    /// Serializes mutations so a snapshot always reflects every committed write.
    writer: Arc<Mutex<()>>,
    snapshot: Option<PathBuf>,
}

impl DocumentStore {
    /// In-memory store without a snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by a JSON snapshot, loading it if it exists.
    pub fn open(snapshot: PathBuf) -> Result<Self, StoreError> {
        let mut records = HashMap::new();

        if snapshot.exists() {
            let content = std::fs::read(&snapshot).map_err(|source| StoreError::Io {
                path: snapshot.clone(),
                source,
            })?;
            let loaded: Vec<DocumentRecord> =
                serde_json::from_slice(&content).map_err(|source| StoreError::Json {
                    path: snapshot.clone(),
                    source,
                })?;
            info!("Loaded {} documents from {:?}", loaded.len(), snapshot);
            records = loaded.into_iter().map(|r| (r.id.clone(), r)).collect();
        }

        Ok(Self {
            inner: Arc::new(RwLock::new(records)),
            writer: Arc::new(Mutex::new(())),
            snapshot: Some(snapshot),
        })
    }

    /// Insert a record. The snapshot is written before the record becomes
    /// visible; on failure the store is unchanged.
    pub async fn insert(&self, record: DocumentRecord) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        debug!("DocumentStore: inserting {}", record.id);

        if self.snapshot.is_some() {
            let mut next = self.cloned_records();
            next.insert(record.id.clone(), record.clone());
            self.persist(&next).await?;
        }

        self.write_records().insert(record.id.clone(), record);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<DocumentRecord> {
        self.read_records().get(id).cloned()
    }

    /// Records matching `filter`, oldest first.
    pub fn list(&self, filter: DocumentFilter) -> Vec<DocumentRecord> {
        let mut matching: Vec<DocumentRecord> = self
            .read_records()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        matching
    }

    /// Apply a reviewer decision. Returns `None` for an unknown id. The
    /// record is left untouched when the snapshot cannot be written.
    pub async fn apply_review(
        &self,
        update: &ReviewUpdate,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let _writer = self.writer.lock().await;

        let Some(mut updated) = self.get(&update.id) else {
            return Ok(None);
        };
        updated.manual_review_completed = update.manual_review_completed;
        updated.needs_manual_review = update.needs_manual_review;
        if let Some(rejected) = update.rejected {
            updated.rejected = rejected;
        }
        updated.updated_at = Utc::now();

        if self.snapshot.is_some() {
            let mut next = self.cloned_records();
            next.insert(updated.id.clone(), updated.clone());
            self.persist(&next).await?;
        }

        self.write_records().insert(updated.id.clone(), updated.clone());
        info!(
            "Review recorded for {} (rejected: {})",
            updated.id, updated.rejected
        );
        Ok(Some(updated))
    }

    pub fn len(&self) -> usize {
        self.read_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_records(&self) -> RwLockReadGuard<'_, HashMap<String, DocumentRecord>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_records(&self) -> RwLockWriteGuard<'_, HashMap<String, DocumentRecord>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn cloned_records(&self) -> HashMap<String, DocumentRecord> {
        self.read_records().clone()
    }

    async fn persist(&self, records: &HashMap<String, DocumentRecord>) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let mut all: Vec<&DocumentRecord> = records.values().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let json = serde_json::to_vec_pretty(&all).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(needs_review: bool) -> DocumentRecord {
        let mut fields = Map::new();
        fields.insert("surname".into(), json!({"value": "DOE", "confidence": "high"}));
        let mut r = DocumentRecord::new("american_passport", fields);
        r.needs_manual_review = needs_review;
        r
    }

    #[tokio::test]
    async fn test_insert_and_filter() {
        let store = DocumentStore::new();
        let pending = record(true);
        store.insert(pending.clone()).await.unwrap();
        store.insert(record(false)).await.unwrap();

        assert_eq!(store.len(), 2);
        let to_review = store.list(DocumentFilter::pending_review());
        assert_eq!(to_review, vec![pending.clone()]);
        assert_eq!(store.list(DocumentFilter::default()).len(), 2);
        assert_eq!(store.get(&pending.id), Some(pending));
    }

    #[tokio::test]
    async fn test_apply_review() {
        let store = DocumentStore::new();
        let r = record(true);
        store.insert(r.clone()).await.unwrap();

        let updated = store
            .apply_review(&ReviewUpdate::reject(r.id.clone()))
            .await
            .unwrap()
            .unwrap();
        assert!(updated.manual_review_completed);
        assert!(!updated.needs_manual_review);
        assert!(updated.rejected);
        assert!(store.list(DocumentFilter::pending_review()).is_empty());
    }

    #[tokio::test]
    async fn test_apply_review_unknown_id() {
        let store = DocumentStore::new();
        assert!(store
            .apply_review(&ReviewUpdate::approve("missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("documents.json");

        let store = DocumentStore::open(path.clone()).unwrap();
        let r = record(true);
        store.insert(r.clone()).await.unwrap();
        store
            .apply_review(&ReviewUpdate::approve(r.id.clone()))
            .await
            .unwrap();

        let reopened = DocumentStore::open(path).unwrap();
        let loaded = reopened.get(&r.id).unwrap();
        assert!(loaded.manual_review_completed);
        assert!(!loaded.rejected);
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            DocumentStore::open(path),
            Err(StoreError::Json { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.json");
        let store = DocumentStore::open(path.clone()).unwrap();

        let kept = record(true);
        store.insert(kept.clone()).await.unwrap();

        // A directory where the temp file goes makes every snapshot write fail.
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();

        let rejected = record(true);
        assert!(matches!(
            store.insert(rejected.clone()).await,
            Err(StoreError::Io { .. })
        ));
        assert_eq!(store.len(), 1);
        assert!(store.get(&rejected.id).is_none());

        assert!(store
            .apply_review(&ReviewUpdate::approve(kept.id.clone()))
            .await
            .is_err());
        let unchanged = store.get(&kept.id).unwrap();
        assert!(unchanged.needs_manual_review);
        assert!(!unchanged.manual_review_completed);
        assert_eq!(store.list(DocumentFilter::pending_review()).len(), 1);

        let reopened = DocumentStore::open(path).unwrap();
        assert_eq!(reopened.len(), 1);
    }
}
