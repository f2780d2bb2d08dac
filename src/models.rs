use crate::ai::{EditPreset, FocusPoint, TextPreset};
use crate::products::UpdateOutcome;
use serde::{Deserialize, Serialize};

/// Body of every error response and of plain acknowledgements.
#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

impl ApiMessage {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: UpdateOutcome,
}

impl From<UpdateOutcome> for SaveResponse {
    fn from(outcome: UpdateOutcome) -> Self {
        Self {
            success: true,
            outcome,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditRequest {
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub preset: Option<EditPreset>,
    /// Overrides the session hotspot for this edit.
    #[serde(default)]
    pub focus: Option<FocusPoint>,
}

impl EditRequest {
    /// Free-form text wins over a preset; one of them must be present.
    pub fn resolved_instruction(&self) -> Option<String> {
        self.instruction
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .or_else(|| self.preset.map(|preset| preset.instruction().to_string()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DescribeRequest {
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub preset: Option<TextPreset>,
}

impl DescribeRequest {
    pub fn resolved_instruction(&self) -> String {
        self.instruction
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.preset.unwrap_or_default().instruction().to_string())
    }
}

/// Saves the current artifact (image targets) or text (text targets) of a
/// session image against a product.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSaveRequest {
    pub sku: String,
    pub target: String,
    /// Text to save; falls back to the image's generated text.
    #[serde(default)]
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_instruction_prefers_free_text() {
        let request: EditRequest = serde_json::from_str(
            r#"{"instruction": " make it shine ", "preset": "white_background"}"#,
        )
        .unwrap();
        assert_eq!(request.resolved_instruction().as_deref(), Some("make it shine"));

        let request: EditRequest =
            serde_json::from_str(r#"{"instruction": "  ", "preset": "white_background"}"#).unwrap();
        assert_eq!(
            request.resolved_instruction().as_deref(),
            Some(EditPreset::WhiteBackground.instruction())
        );

        let request: EditRequest = serde_json::from_str("{}").unwrap();
        assert!(request.resolved_instruction().is_none());
    }

    #[test]
    fn describe_defaults_to_stage_description() {
        let request = DescribeRequest::default();
        assert_eq!(
            request.resolved_instruction(),
            TextPreset::StageDescription.instruction()
        );
    }
}
