//! services/app/src/adapters/recognition.rs
//!
//! This module contains the adapter for the medicine recogniser.
//! It implements the `RecognitionService` port from the `core` crate by sending
//! the captured photo to an OpenAI-compatible vision model.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveDate;
use meditect_core::domain::{MedicineGuess, ScanResult};
use meditect_core::ports::{PortError, PortResult, RecognitionService};
use serde::Deserialize;
use tracing::debug;

const SYSTEM_INSTRUCTIONS: &str = r#"You read photos of medicine packaging.
Reply with a single JSON object and nothing else, using exactly these keys:
{"name": string|null, "manufacturer": string|null, "expiry_date": "YYYY-MM-DD"|null,
 "batch_number": string|null, "dosage": string|null, "confidence": number between 0 and 1}
Use null for anything you cannot read. When only a month and year are printed as the
expiry, use the last day of that month."#;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `RecognitionService` using an OpenAI-compatible vision model.
#[derive(Clone)]
pub struct OpenAiRecognitionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiRecognitionAdapter {
    /// Creates a new `OpenAiRecognitionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// Response Parsing
//=========================================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawGuess {
    name: Option<String>,
    manufacturer: Option<String>,
    expiry_date: Option<String>,
    batch_number: Option<String>,
    dosage: Option<String>,
    confidence: Option<f32>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

/// Extracts the JSON object from a model reply, tolerating Markdown code fences
/// and surrounding prose.
fn parse_guess(reply: &str) -> PortResult<ScanResult> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(PortError::Unexpected(
                "Recognition reply contained no JSON object.".to_string(),
            ))
        }
    };
    let raw: RawGuess = serde_json::from_str(json)
        .map_err(|e| PortError::Unexpected(format!("Unreadable recognition reply: {}", e)))?;

    let expiry_date = non_empty(raw.expiry_date)
        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());

    let guess = MedicineGuess {
        name: non_empty(raw.name),
        manufacturer: non_empty(raw.manufacturer),
        expiry_date,
        batch_number: non_empty(raw.batch_number),
        dosage: non_empty(raw.dosage),
    };
    Ok(ScanResult::new(guess, raw.confidence.unwrap_or(0.0)))
}

//=========================================================================================
// `RecognitionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecognitionService for OpenAiRecognitionAdapter {
    async fn recognize(&self, image: &[u8], content_type: &str) -> PortResult<ScanResult> {
        if image.is_empty() {
            return Err(PortError::Rejected("Empty image".to_string()));
        }
        let data_url = format!("data:{};base64,{}", content_type, STANDARD.encode(image));

        let parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text("Identify the medicine in this photo.")
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(data_url)
                        .detail(ImageDetail::High)
                        .build()
                        .map_err(|e| PortError::Unexpected(e.to_string()))?,
                )
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(parts)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Recognition model returned no text content.".to_string())
            })?;
        debug!(reply_len = content.len(), "recognition reply received");

        parse_guess(&content)
    }
}
