//! Wire types shared by the HTTP API and the client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Standard `{data, message}` response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub message: String,
}

impl<T> Envelope<T> {
    pub fn new(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
        }
    }
}

/// Body of every non-success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Successful `POST /process` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub document_id: String,
    pub document_type: String,
    pub extracted_data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Value,
    pub needs_manual_review: bool,
    #[serde(default)]
    pub document_image_url: Option<String>,
}

/// A stored document as listed for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDocument {
    pub id: String,
    pub document_type: String,
    #[serde(default)]
    pub extracted_data: Map<String, Value>,
    #[serde(default)]
    pub document_image_url: Option<String>,
    #[serde(default)]
    pub viewable_url: Option<String>,
    pub needs_manual_review: bool,
    pub manual_review_completed: bool,
    #[serde(default)]
    pub rejected: bool,
}

/// Body of `PUT /documents`.
///
/// `rejected` is only sent for rejections; approvals omit the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewUpdate {
    pub id: String,
    pub manual_review_completed: bool,
    pub needs_manual_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<bool>,
}

impl ReviewUpdate {
    pub fn approve(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            manual_review_completed: true,
            needs_manual_review: false,
            rejected: None,
        }
    }

    pub fn reject(id: impl Into<String>) -> Self {
        Self {
            rejected: Some(true),
            ..Self::approve(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_approve_body_omits_rejected() {
        let body = serde_json::to_value(ReviewUpdate::approve("abc")).unwrap();
        assert_eq!(
            body,
            json!({"id": "abc", "manual_review_completed": true, "needs_manual_review": false})
        );
    }

    #[test]
    fn test_reject_body_sets_rejected() {
        let body = serde_json::to_value(ReviewUpdate::reject("abc")).unwrap();
        assert_eq!(
            body,
            json!({
                "id": "abc",
                "manual_review_completed": true,
                "needs_manual_review": false,
                "rejected": true
            })
        );
    }
}
