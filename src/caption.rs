//! Captioning calls whose output always comes back as a caption record.
//!
//! The multimodal pipeline asks a model to describe images, tables, and
//! equations and expects JSON back. [`RobustCaptioner`] sits between the
//! pipeline and any [`CaptionModel`], so a bad response or a failed call
//! costs structure, never the ingestion run.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::normalize::{self, Normalized, NO_ANALYSIS};

/// One prior turn passed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// Everything a captioning call carries.
#[derive(Debug, Clone, Default)]
pub struct CaptionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub history: Vec<HistoryMessage>,
    /// Base64-encoded image for vision models.
    pub image_base64: Option<String>,
}

impl CaptionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_image(mut self, image_base64: impl Into<String>) -> Self {
        self.image_base64 = Some(image_base64.into());
        self
    }
}

/// A language or vision model used for captioning.
///
/// `Ok(None)` means the model answered with nothing at all.
#[async_trait]
pub trait CaptionModel: Send + Sync {
    async fn complete(&self, request: &CaptionRequest) -> Result<Option<String>>;
}

/// Wraps a model so every call yields a well-formed caption record.
pub struct RobustCaptioner<M> {
    model: M,
}

impl<M: CaptionModel> RobustCaptioner<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Call the model and normalise whatever comes back.
    pub async fn caption(&self, request: &CaptionRequest) -> Normalized {
        match self.model.complete(request).await {
            Ok(Some(raw)) => normalize::normalize(&raw),
            Ok(None) => {
                warn!("caption model returned no content, using placeholder record");
                empty_response()
            }
            Err(e) => normalize::error_record(&format!("{:#}", e), ""),
        }
    }
}

fn empty_response() -> Normalized {
    let raw = serde_json::json!({
        "description": NO_ANALYSIS,
        "entities": [],
        "content": "Unable to process content",
    })
    .to_string();
    normalize::normalize(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Recovery;
    use std::sync::Mutex;

    struct Scripted {
        reply: Mutex<Option<Result<Option<String>>>>,
        seen: Mutex<Vec<CaptionRequest>>,
    }

    impl Scripted {
        fn new(reply: Result<Option<String>>) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CaptionModel for Scripted {
        async fn complete(&self, request: &CaptionRequest) -> Result<Option<String>> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.lock().unwrap().take().unwrap_or(Ok(None))
        }
    }

    #[tokio::test]
    async fn normalizes_model_reply() {
        let captioner = RobustCaptioner::new(Scripted::new(Ok(Some(
            "```json\n{\"description\": \"A bar chart\", \"entities\": [\"Q3\"]}\n```".to_string(),
        ))));
        let req = CaptionRequest::new("Describe this image")
            .with_system_prompt("You are an analyst")
            .with_image("aGVsbG8=");
        let out = captioner.caption(&req).await;
        assert_eq!(out.caption.description, "A bar chart");
        assert_eq!(out.entity_count, 1);

        let seen = captioner.model().seen.lock().unwrap();
        assert_eq!(seen[0].system_prompt.as_deref(), Some("You are an analyst"));
        assert_eq!(seen[0].image_base64.as_deref(), Some("aGVsbG8="));
    }

    #[tokio::test]
    async fn empty_reply_yields_placeholder() {
        let captioner = RobustCaptioner::new(Scripted::new(Ok(None)));
        let out = captioner.caption(&CaptionRequest::new("p")).await;
        assert_eq!(out.recovery, Recovery::Parsed);
        assert_eq!(out.caption.description, NO_ANALYSIS);
        assert_eq!(
            out.caption.fields["content"],
            serde_json::json!("Unable to process content")
        );
    }

    #[tokio::test]
    async fn model_error_yields_error_record() {
        let captioner =
            RobustCaptioner::new(Scripted::new(Err(anyhow::anyhow!("rate limited"))));
        let out = captioner.caption(&CaptionRequest::new("p")).await;
        assert_eq!(out.recovery, Recovery::Error);
        assert!(out.caption.is_error());
        assert!(out.caption.description.contains("rate limited"));
        assert_eq!(out.caption.original_content(), Some("No content available"));
    }
}
