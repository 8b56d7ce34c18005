//! OpenAI-compatible chat completions client for vision prompts.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LlmSettings;

/// Sampling parameters shared by every structured request.
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 1000,
        }
    }
}

/// Chat client for an OpenAI-compatible endpoint (Fireworks by default).
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(settings: &LlmSettings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    /// Ask each model in turn for a JSON object matching `schema`, returning
    /// the first response that parses as `T`.
    pub async fn chat_json_with_fallbacks<T: DeserializeOwned>(
        &self,
        models: &[String],
        messages: Vec<Message>,
        schema: serde_json::Value,
        sampling: Sampling,
    ) -> Result<T> {
        let mut last_error: Option<anyhow::Error> = None;

        for model in models {
            let request = ChatCompletionRequest {
                model: model.clone(),
                messages: messages.clone(),
                temperature: Some(sampling.temperature),
                max_tokens: Some(sampling.max_tokens),
                response_format: Some(ResponseFormat::JsonObject {
                    schema: schema.clone(),
                }),
            };

            let attempt = self
                .send_request(request)
                .await
                .and_then(|content| parse_llm_json::<T>(&content));

            match attempt {
                Ok(parsed) => return Ok(parsed),
                Err(e) => {
                    warn!("Model {} failed with error: {:#}. Attempting next model...", model, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e.context("All models failed")),
            None => anyhow::bail!("No models configured"),
        }
    }

    async fn send_request(&self, request: ChatCompletionRequest) -> Result<String> {
        debug!("Sending chat completion request: model={}", request.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send chat completion request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error ({}): {}", status, error_text);
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        if let Some(usage) = &response.usage {
            info!(
                "LLM response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(content)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat {
    JsonObject { schema: serde_json::Value },
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    /// A user message carrying one image (as a base64 data URL) followed by text.
    pub fn user_with_image(text: impl Into<String>, image: &[u8]) -> Self {
        let data_url = format!("data:{};base64,{}", sniff_image_mime(image), BASE64.encode(image));
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
                ContentPart::Text { text: text.into() },
            ]),
        }
    }
}

/// Image MIME type from magic bytes, if the bytes look like a known image format.
pub fn detect_image_mime(data: &[u8]) -> Option<&'static str> {
    match image::guess_format(data).ok()? {
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Gif => Some("image/gif"),
        image::ImageFormat::WebP => Some("image/webp"),
        image::ImageFormat::Bmp => Some("image/bmp"),
        image::ImageFormat::Tiff => Some("image/tiff"),
        _ => None,
    }
}

fn sniff_image_mime(data: &[u8]) -> &'static str {
    detect_image_mime(data).unwrap_or("image/jpeg")
}

/// Parse a model reply as JSON, tolerating markdown code fences.
pub fn parse_llm_json<T: DeserializeOwned>(response: &str) -> Result<T> {
    let json_str = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(response)
            .trim()
    } else if response.contains("```") {
        response.split("```").nth(1).unwrap_or(response).trim()
    } else {
        response.trim()
    };

    serde_json::from_str(json_str).context(format!(
        "JSON structure mismatch: {}",
        json_str.chars().take(200).collect::<String>()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Reply {
        answer: String,
    }

    #[test]
    fn test_parse_plain_json() {
        let r: Reply = parse_llm_json(r#" {"answer": "yes"} "#).unwrap();
        assert_eq!(r.answer, "yes");
    }

    #[test]
    fn test_parse_fenced_json() {
        let r: Reply = parse_llm_json("Here:\n```json\n{\"answer\": \"fenced\"}\n```\n").unwrap();
        assert_eq!(r.answer, "fenced");
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(parse_llm_json::<Reply>(r#"{"other": 1}"#).is_err());
    }

    #[test]
    fn test_image_message_shape() {
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let msg = Message::user_with_image("Classify", &png_magic);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        let url = json["content"][0]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(json["content"][1]["type"], "text");
    }

    #[test]
    fn test_response_format_serialization() {
        let format = ResponseFormat::JsonObject {
            schema: serde_json::json!({"type": "object"}),
        };
        let json = serde_json::to_value(&format).unwrap();
        assert_eq!(json["type"], "json_object");
        assert_eq!(json["schema"]["type"], "object");
    }
}
