//! ID document processing pipeline.
//!
//! An image is first classified; supported document types then go through a
//! type-specific field extraction. The vision model sits behind the
//! [`DocumentAnalyzer`] trait so the pipeline can run against a stub.

pub mod classification;
pub mod fields;
pub mod license;
pub mod passport;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::LlmSettings;
use crate::llm::{LlmClient, Sampling};
use classification::{DocumentClassification, DocumentType};
use license::{LicenseData, LicenseDataResponse};
use passport::{PassportData, PassportDataResponse};

/// Vision backend used by the pipeline.
#[async_trait::async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    async fn classify(&self, image: &[u8]) -> anyhow::Result<DocumentClassification>;
    async fn extract_passport(&self, image: &[u8]) -> anyhow::Result<PassportDataResponse>;
    async fn extract_license(&self, image: &[u8]) -> anyhow::Result<LicenseDataResponse>;
}

/// Why an image could not be turned into extracted fields.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Unsupported document type: {0}")]
    UnsupportedDocumentType(DocumentType),

    #[error("Document not recognized")]
    DocumentNotRecognized,

    #[error(transparent)]
    Analysis(#[from] anyhow::Error),
}

/// Fields extracted for a supported document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractedFields {
    Passport(PassportData),
    License(LicenseData),
}

impl ExtractedFields {
    /// Field name to field object, as stored and served to reviewers.
    pub fn to_map(&self) -> Map<String, Value> {
        let value = match self {
            Self::Passport(data) => serde_json::to_value(data),
            Self::License(data) => serde_json::to_value(data),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Raw model outputs kept alongside the extracted fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub classification: DocumentClassification,
    pub extraction_analysis: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedDocument {
    pub document_type: DocumentType,
    pub fields: ExtractedFields,
    pub metadata: ProcessingMetadata,
}

impl ProcessedDocument {
    pub fn needs_manual_review(&self) -> bool {
        fields::any_unsure(&self.fields.to_map())
    }
}

/// Classify the image and extract its fields.
pub async fn process_document(
    analyzer: &dyn DocumentAnalyzer,
    image: &[u8],
) -> Result<ProcessedDocument, ProcessError> {
    let classification = analyzer.classify(image).await?;
    debug!(
        "Classified as {}: {}",
        classification.document_type, classification.image_analysis
    );

    let document_type = classification.document_type;
    if !document_type.is_recognized() {
        info!("Document not recognized: {}", classification.image_analysis);
        return Err(ProcessError::DocumentNotRecognized);
    }

    let (fields, extraction_analysis) = match document_type {
        DocumentType::AmericanPassport => {
            let response = analyzer.extract_passport(image).await?;
            (ExtractedFields::Passport(response.passport_data), response.image_analysis)
        }
        DocumentType::AmericanDriversLicense => {
            let response = analyzer.extract_license(image).await?;
            (ExtractedFields::License(response.license_data), response.image_analysis)
        }
        other => {
            info!("Unsupported document type {}: {}", other, classification.image_analysis);
            return Err(ProcessError::UnsupportedDocumentType(other));
        }
    };

    Ok(ProcessedDocument {
        document_type,
        fields,
        metadata: ProcessingMetadata {
            classification,
            extraction_analysis,
        },
    })
}

/// [`DocumentAnalyzer`] backed by the chat completions API.
pub struct LlmAnalyzer {
    client: LlmClient,
    classification_models: Vec<String>,
    extraction_models: Vec<String>,
    sampling: Sampling,
}

impl LlmAnalyzer {
    pub fn new(settings: &LlmSettings) -> Self {
        Self {
            client: LlmClient::new(settings),
            classification_models: settings.classification_models.clone(),
            extraction_models: settings.extraction_models.clone(),
            sampling: Sampling::default(),
        }
    }
}

#[async_trait::async_trait]
impl DocumentAnalyzer for LlmAnalyzer {
    async fn classify(&self, image: &[u8]) -> anyhow::Result<DocumentClassification> {
        self.client
            .chat_json_with_fallbacks(
                &self.classification_models,
                classification::messages(image),
                classification::response_schema(),
                self.sampling,
            )
            .await
    }

    async fn extract_passport(&self, image: &[u8]) -> anyhow::Result<PassportDataResponse> {
        self.client
            .chat_json_with_fallbacks(
                &self.extraction_models,
                passport::messages(image),
                passport::response_schema(),
                self.sampling,
            )
            .await
    }

    async fn extract_license(&self, image: &[u8]) -> anyhow::Result<LicenseDataResponse> {
        self.client
            .chat_json_with_fallbacks(
                &self.extraction_models,
                license::messages(image),
                license::response_schema(),
                self.sampling,
            )
            .await
    }
}
