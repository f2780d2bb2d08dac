use super::{
    AiError, FocusPoint, GeneratedImage, GenerativeModel, InlineImage, describe_prompt, edit_prompt,
};
use crate::config::env_string;
use crate::http::build_client;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub image_model: String,
    pub text_model: String,
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_string("GEMINI_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".into()),
            api_key: env_string("GEMINI_API_KEY"),
            image_model: env_string("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| "gemini-2.5-flash-image".into()),
            text_model: env_string("GEMINI_TEXT_MODEL")
                .unwrap_or_else(|| "gemini-2.5-flash".into()),
        }
    }
}

pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig, timeout_secs: u64, connect_timeout_secs: u64) -> Self {
        Self {
            http: build_client(timeout_secs, connect_timeout_secs),
            config,
        }
    }

    async fn generate(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, AiError> {
        let api_key = self.config.api_key.as_deref().ok_or(AiError::MissingApiKey)?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| AiError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(target = "studio.ai", %status, model, "generative model rejected request");
            return Err(AiError::Network(format!(
                "HTTP {status}: {}",
                detail.chars().take(300).collect::<String>()
            )));
        }

        response
            .json()
            .await
            .map_err(|err| AiError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn edit_image(
        &self,
        image: InlineImage<'_>,
        instruction: &str,
        focus: Option<FocusPoint>,
    ) -> Result<GeneratedImage, AiError> {
        let started = Instant::now();
        let body = GenerateContentRequest::new(
            image,
            edit_prompt(instruction, focus),
            Some(vec!["IMAGE", "TEXT"]),
        );
        let response = self.generate(&self.config.image_model, &body).await?;
        crate::metrics::ai_elapsed("edit_image", started.elapsed().as_millis());
        let result = extract_image(response);
        if let Ok(generated) = &result {
            info!(
                target = "studio.ai",
                bytes = generated.data.len(),
                mime = %generated.mime_type,
                focused = focus.is_some(),
                "image edit generated"
            );
        }
        result
    }

    async fn describe(&self, image: InlineImage<'_>, instruction: &str) -> Result<String, AiError> {
        let started = Instant::now();
        let body = GenerateContentRequest::new(image, describe_prompt(instruction), None);
        let response = self.generate(&self.config.text_model, &body).await?;
        crate::metrics::ai_elapsed("describe", started.elapsed().as_millis());
        extract_text(response)
    }
}

/// Blocked first, then any image part, then a non-normal stop, else empty.
pub(crate) fn extract_image(response: GenerateContentResponse) -> Result<GeneratedImage, AiError> {
    if let Some(reason) = response.block_reason() {
        return Err(AiError::Blocked { reason });
    }
    let candidate = response.candidates.into_iter().next();
    let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
    let parts = candidate
        .and_then(|c| c.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    if let Some(inline) = parts.iter().find_map(|part| part.inline_data.as_ref()) {
        let data = BASE64
            .decode(inline.data.as_bytes())
            .map_err(|err| AiError::InvalidResponse(format!("image payload: {err}")))?;
        return Ok(GeneratedImage {
            data,
            mime_type: inline.mime_type.clone(),
        });
    }

    if let Some(reason) = finish_reason.filter(|reason| !is_normal_stop(reason)) {
        return Err(AiError::GenerationStopped { reason });
    }
    Err(AiError::EmptyResult {
        text: joined_text(&parts),
    })
}

pub(crate) fn extract_text(response: GenerateContentResponse) -> Result<String, AiError> {
    if let Some(reason) = response.block_reason() {
        return Err(AiError::Blocked { reason });
    }
    let candidate = response.candidates.into_iter().next();
    let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
    let parts = candidate
        .and_then(|c| c.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    if let Some(text) = joined_text(&parts) {
        return Ok(text);
    }
    if let Some(reason) = finish_reason.filter(|reason| !is_normal_stop(reason)) {
        return Err(AiError::GenerationStopped { reason });
    }
    Err(AiError::EmptyResult { text: None })
}

fn is_normal_stop(reason: &str) -> bool {
    reason.eq_ignore_ascii_case("STOP") || reason.eq_ignore_ascii_case("FINISH_REASON_UNSPECIFIED")
}

fn joined_text(parts: &[Part]) -> Option<String> {
    let text = parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() { None } else { Some(text) }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    fn new(image: InlineImage<'_>, prompt: String, modalities: Option<Vec<&'static str>>) -> Self {
        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type.to_string(),
                            data: BASE64.encode(image.data),
                        },
                    },
                    RequestPart::Text { text: prompt },
                ],
            }],
            generation_config: modalities.map(|response_modalities| GenerationConfig {
                response_modalities,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    #[serde(rename_all = "camelCase")]
    InlineData { inline_data: InlineData },
    Text { text: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    fn block_reason(&self) -> Option<String> {
        let feedback = self.prompt_feedback.as_ref()?;
        let reason = feedback.block_reason.as_ref()?;
        Some(match &feedback.block_reason_message {
            Some(message) if !message.trim().is_empty() => format!("{reason}: {message}"),
            _ => reason.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).expect("response json")
    }

    #[test]
    fn blocked_prompt_wins_over_everything() {
        let response = parse(json!({
            "promptFeedback": { "blockReason": "SAFETY", "blockReasonMessage": "person detected" },
            "candidates": [{ "content": { "parts": [{ "inlineData": { "mimeType": "image/png", "data": "AQID" } }] } }]
        }));
        match extract_image(response) {
            Err(AiError::Blocked { reason }) => assert_eq!(reason, "SAFETY: person detected"),
            other => panic!("expected blocked, got {other:?}"),
        }
    }

    #[test]
    fn image_part_is_decoded() {
        let response = parse(json!({
            "candidates": [{
                "finishReason": "STOP",
                "content": { "parts": [
                    { "text": "here you go" },
                    { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
                ] }
            }]
        }));
        let image = extract_image(response).expect("image");
        assert_eq!(image.data, vec![1, 2, 3]);
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn abnormal_stop_without_image_is_reported() {
        let response = parse(json!({
            "candidates": [{ "finishReason": "IMAGE_SAFETY", "content": { "parts": [] } }]
        }));
        match extract_image(response) {
            Err(AiError::GenerationStopped { reason }) => assert_eq!(reason, "IMAGE_SAFETY"),
            other => panic!("expected stopped, got {other:?}"),
        }
    }

    #[test]
    fn text_only_reply_is_empty_result_with_context() {
        let response = parse(json!({
            "candidates": [{ "finishReason": "STOP", "content": { "parts": [{ "text": "I cannot edit this" }] } }]
        }));
        match extract_image(response) {
            Err(AiError::EmptyResult { text }) => {
                assert_eq!(text.as_deref(), Some("I cannot edit this"))
            }
            other => panic!("expected empty, got {other:?}"),
        }
    }

    #[test]
    fn no_candidates_is_empty_result() {
        assert!(matches!(
            extract_image(parse(json!({}))),
            Err(AiError::EmptyResult { text: None })
        ));
    }

    #[test]
    fn text_extraction_joins_parts() {
        let response = parse(json!({
            "candidates": [{ "content": { "parts": [{ "text": " Gold ring. " }, { "text": "Handmade." }] } }]
        }));
        assert_eq!(extract_text(response).unwrap(), "Gold ring.\nHandmade.");
    }

    #[test]
    fn text_extraction_reports_stop_reason() {
        let response = parse(json!({
            "candidates": [{ "finishReason": "MAX_TOKENS", "content": { "parts": [] } }]
        }));
        assert!(matches!(
            extract_text(response),
            Err(AiError::GenerationStopped { .. })
        ));
    }

    #[test]
    fn request_body_uses_inline_data_and_modalities() {
        let image = InlineImage {
            data: &[1, 2, 3],
            mime_type: "image/jpeg",
        };
        let body = GenerateContentRequest::new(image, "do it".into(), Some(vec!["IMAGE", "TEXT"]));
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            json!("image/jpeg")
        );
        assert_eq!(value["contents"][0]["parts"][0]["inlineData"]["data"], json!("AQID"));
        assert_eq!(value["contents"][0]["parts"][1]["text"], json!("do it"));
        assert_eq!(
            value["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_network() {
        let config = GeminiConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: None,
            image_model: "m".into(),
            text_model: "t".into(),
        };
        let client = GeminiClient::new(config, 1, 1);
        let image = InlineImage {
            data: &[0],
            mime_type: "image/png",
        };
        assert!(matches!(
            client.describe(image, "hi").await,
            Err(AiError::MissingApiKey)
        ));
    }
}
