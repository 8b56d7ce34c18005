//! Document type classification.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::Message;

/// Every document class the classifier may answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    AmericanPassport,
    ForeignPassport,
    AmericanDriversLicense,
    ForeignDriversLicense,
    OtherValidDocument,
    #[serde(rename = "indecipherable")]
    Indecipherable,
    NotADocument,
}

impl DocumentType {
    pub const ALL: [DocumentType; 7] = [
        Self::AmericanPassport,
        Self::ForeignPassport,
        Self::AmericanDriversLicense,
        Self::ForeignDriversLicense,
        Self::OtherValidDocument,
        Self::Indecipherable,
        Self::NotADocument,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmericanPassport => "american_passport",
            Self::ForeignPassport => "foreign_passport",
            Self::AmericanDriversLicense => "american_drivers_license",
            Self::ForeignDriversLicense => "foreign_drivers_license",
            Self::OtherValidDocument => "other_valid_document",
            Self::Indecipherable => "indecipherable",
            Self::NotADocument => "not_a_document",
        }
    }

    /// False for images that are not a legible identity document at all.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Indecipherable | Self::NotADocument)
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentClassification {
    pub image_analysis: String,
    pub document_type: DocumentType,
}

const SYSTEM_PROMPT: &str = "You are a precise document scanner specialized in extracting \
information from a valid identification document. You must determine if the provided image \
depicts a valid identification document and classify it accordingly.";

pub(crate) fn messages(image: &[u8]) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user_with_image("Classify the following image of a document.", image),
    ]
}

pub(crate) fn response_schema() -> serde_json::Value {
    let types: Vec<&str> = DocumentType::ALL.iter().map(|t| t.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "image_analysis": { "type": "string" },
            "document_type": { "type": "string", "enum": types }
        },
        "required": ["image_analysis", "document_type"]
    })
}
