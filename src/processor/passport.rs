//! Passport field extraction.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::fields::{fields_schema, FieldExtraction};
use crate::llm::Message;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassportData {
    pub issuing_country: FieldExtraction,
    pub passport_number: FieldExtraction,
    pub surname: FieldExtraction,
    pub given_names: FieldExtraction,
    pub nationality: FieldExtraction,
    pub birth_date: FieldExtraction,
    pub sex: FieldExtraction,
    pub place_of_birth: FieldExtraction,
    pub date_of_issue: FieldExtraction,
    pub date_of_expiry: FieldExtraction,
    pub authority: FieldExtraction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassportDataResponse {
    pub image_analysis: String,
    pub passport_data: PassportData,
}

const FIELDS: &[&str] = &[
    "issuing_country",
    "passport_number",
    "surname",
    "given_names",
    "nationality",
    "birth_date",
    "sex",
    "place_of_birth",
    "date_of_issue",
    "date_of_expiry",
    "authority",
];

const SYSTEM_PROMPT: &str = r#"You are a precise document scanner specialized in extracting information from passports.
For each field, you must:
1. Determine if the field is visible or not.
2. Extract the value of the field.
3. Provide a confidence level in the extraction. If a field is not visible, the confidence level should be 'unsure'.

Mark a field as 'unsure' if:
- Any part of the text is unclear or ambiguous
- There are multiple possible interpretations
- The field is partially obscured or damaged
- The text is too blurry to read with certainty
- There is glare or other visual interference that makes the text unclear

Special considerations:
- All dates should be in DD/MM/YYYY format (international standard for passports)
- Passport numbers may contain both letters and numbers
- Names should be extracted exactly as shown, including special characters and diacritical marks
- For the sex field, use 'M', 'F', or 'X' only

Carefully examine the image and provide a short 1 sentence analysis of the image before extracting the data."#;

pub(crate) fn messages(image: &[u8]) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user_with_image(
            "Extract the passport information and mark your confidence for each field.",
            image,
        ),
    ]
}

pub(crate) fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "image_analysis": { "type": "string" },
            "passport_data": fields_schema(FIELDS)
        },
        "required": ["image_analysis", "passport_data"]
    })
}
