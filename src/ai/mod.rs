//! Façade over the generative image/text model.
//!
//! Callers hand over an image plus a plain-language instruction and get back
//! either a new image or text. Every failure shape the model can produce is
//! folded into [`AiError`].

pub mod gemini;

pub use gemini::{GeminiClient, GeminiConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sent ahead of every instruction. The model is asked to honour it; nothing
/// in this crate can verify that it did.
pub const CONTENT_POLICY: &str = "You are editing product photography for a fine jewelry \
business. Only change what the instruction asks for. Never alter a person's identity, \
face, skin tone, ethnicity, body shape or apparent age. Keep the jewelry design, metal \
colour and stones faithful to the original unless explicitly told otherwise.";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("generative model is not configured (missing API key)")]
    MissingApiKey,
    #[error("request to generative model failed: {0}")]
    Network(String),
    #[error("unreadable model response: {0}")]
    InvalidResponse(String),
    #[error("request was blocked: {reason}")]
    Blocked { reason: String },
    #[error("generation stopped early: {reason}")]
    GenerationStopped { reason: String },
    #[error("model returned no result{}", model_said(.text))]
    EmptyResult { text: Option<String> },
}

fn model_said(text: &Option<String>) -> String {
    text.as_deref()
        .map(|text| format!(" (model said: {text})"))
        .unwrap_or_default()
}

/// Pixel coordinate on the source image marking where a localized edit applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusPoint {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct InlineImage<'a> {
    pub data: &'a [u8],
    pub mime_type: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn edit_image(
        &self,
        image: InlineImage<'_>,
        instruction: &str,
        focus: Option<FocusPoint>,
    ) -> Result<GeneratedImage, AiError>;

    async fn describe(&self, image: InlineImage<'_>, instruction: &str) -> Result<String, AiError>;
}

/// Canned edits offered next to the free-form instruction box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPreset {
    RemoveBackground,
    WhiteBackground,
    StudioLighting,
    EnhanceSparkle,
    LifestyleScene,
}

impl EditPreset {
    pub fn instruction(&self) -> &'static str {
        match self {
            EditPreset::RemoveBackground => {
                "Remove the background completely and leave the piece on a transparent background."
            }
            EditPreset::WhiteBackground => {
                "Place the piece on a clean, seamless pure white background with a soft shadow."
            }
            EditPreset::StudioLighting => {
                "Relight the photo with soft, even studio lighting and remove harsh reflections."
            }
            EditPreset::EnhanceSparkle => {
                "Enhance the brilliance of the stones and the polish of the metal without changing their colour."
            }
            EditPreset::LifestyleScene => {
                "Place the piece in a tasteful lifestyle scene on a neutral marble surface."
            }
        }
    }
}

/// Built-in prompts for marketing copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPreset {
    ProductTitle,
    MetaDescription,
    #[default]
    StageDescription,
    AltText,
}

impl TextPreset {
    pub fn instruction(&self) -> &'static str {
        match self {
            TextPreset::ProductTitle => {
                "Write a concise SEO product title (max 60 characters) for this piece. Reply with the title only."
            }
            TextPreset::MetaDescription => {
                "Write a compelling meta description (max 155 characters) for this piece. Reply with the text only."
            }
            TextPreset::StageDescription => {
                "Describe what this photo shows about the piece and its craftsmanship in two or three sentences for a product page."
            }
            TextPreset::AltText => {
                "Write short, descriptive image alt text (max 125 characters) for this photo. Reply with the text only."
            }
        }
    }
}

pub fn edit_prompt(instruction: &str, focus: Option<FocusPoint>) -> String {
    let mut prompt = format!("{CONTENT_POLICY}\n\nInstruction: {}", instruction.trim());
    if let Some(point) = focus {
        prompt.push_str(&format!(
            "\nApply the edit only around pixel coordinates x={}, y={} of the supplied image; leave everything else untouched.",
            point.x, point.y
        ));
    }
    prompt
}

pub fn describe_prompt(instruction: &str) -> String {
    format!(
        "{CONTENT_POLICY}\n\nYou write marketing copy for a handmade jewelry store.\n{}",
        instruction.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_prompt_carries_policy_and_focus() {
        let prompt = edit_prompt("change shirt to blue", Some(FocusPoint { x: 120, y: 80 }));
        assert!(prompt.starts_with(CONTENT_POLICY));
        assert!(prompt.contains("Instruction: change shirt to blue"));
        assert!(prompt.contains("x=120, y=80"));
    }

    #[test]
    fn edit_prompt_without_focus_is_global() {
        let prompt = edit_prompt("  brighten  ", None);
        assert!(prompt.ends_with("Instruction: brighten"));
    }

    #[test]
    fn empty_result_message_includes_model_text() {
        let err = AiError::EmptyResult {
            text: Some("I can't do that".into()),
        };
        assert_eq!(
            err.to_string(),
            "model returned no result (model said: I can't do that)"
        );
        let bare = AiError::EmptyResult { text: None };
        assert_eq!(bare.to_string(), "model returned no result");
    }
}
