//! Driver's license field extraction.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::fields::{fields_schema, FieldExtraction};
use crate::llm::Message;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseData {
    pub issuing_state: FieldExtraction,
    pub license_number: FieldExtraction,
    pub surname: FieldExtraction,
    pub given_names: FieldExtraction,
    pub address: FieldExtraction,
    pub birth_date: FieldExtraction,
    pub sex: FieldExtraction,
    pub date_of_issue: FieldExtraction,
    pub date_of_expiry: FieldExtraction,
    pub license_class: FieldExtraction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseDataResponse {
    pub image_analysis: String,
    pub license_data: LicenseData,
}

const FIELDS: &[&str] = &[
    "issuing_state",
    "license_number",
    "surname",
    "given_names",
    "address",
    "birth_date",
    "sex",
    "date_of_issue",
    "date_of_expiry",
    "license_class",
];

const SYSTEM_PROMPT: &str = r#"You are a precise document scanner specialized in extracting information from US driver's licenses.
For each field, you must:
1. Determine if the field is visible or not.
2. Extract the value of the field.
3. Provide a confidence level in the extraction. If a field is not visible, the confidence level should be 'unsure'.

Mark a field as 'unsure' if any part of the text is unclear, partially obscured, blurry, or affected by glare.

Special considerations:
- All dates should be in MM/DD/YYYY format (US standard for driver's licenses)
- License numbers may contain both letters and numbers
- Extract the full address as printed, on a single line
- For the sex field, use 'M', 'F', or 'X' only

Carefully examine the image and provide a short 1 sentence analysis of the image before extracting the data."#;

pub(crate) fn messages(image: &[u8]) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user_with_image(
            "Extract the driver's license information and mark your confidence for each field.",
            image,
        ),
    ]
}

pub(crate) fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "image_analysis": { "type": "string" },
            "license_data": fields_schema(FIELDS)
        },
        "required": ["image_analysis", "license_data"]
    })
}
