//! HTTP client for the text-understanding service.
//!
//! The service wraps the language model behind a small JSON API. Responses
//! come from a model, so every payload is shape-checked here before it
//! crosses into the domain types.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use vforge_models::validate::TARGETABLE_FIELDS;
use vforge_models::{Intent, QualityMode, ShotPlan, Template};

use crate::config::MlConfig;
use crate::error::{MlError, MlResult};
use crate::types::{
    EmbeddingsRequest, EmbeddingsResponse, FeedbackDelta, InstantiatePlanRequest,
    ParseFeedbackRequest, ParseIntentRequest,
};

/// Client for the text-understanding service.
#[derive(Debug, Clone)]
pub struct MlClient {
    http: Client,
    base_url: String,
}

impl MlClient {
    /// Create a new client.
    pub fn new(config: MlConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("vforge-ml-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(MlError::Network)?;

        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(MlConfig::from_env()?)
    }

    /// Parse free text into a structured intent.
    ///
    /// An empty creative brief in the response is replaced with the raw
    /// input text, which downstream prompt compilation can always use.
    pub async fn parse_intent(&self, text: &str, quality_mode: QualityMode) -> MlResult<Intent> {
        let request = ParseIntentRequest {
            text,
            quality_mode: quality_mode.as_str(),
        };
        let body = self.post_for_body("/v1/intent/parse", &request).await?;

        let mut intent: Intent = serde_json::from_str(&body)
            .map_err(|e| MlError::parse_error(format!("malformed intent payload: {e}")))?;

        if intent.topic.trim().is_empty() {
            return Err(MlError::parse_error("intent has no topic"));
        }
        if intent.optimized_prompt.trim().is_empty() {
            intent.optimized_prompt = text.to_string();
        }

        debug!(topic = %intent.topic, goal = %intent.intent, "intent parsed");
        Ok(intent)
    }

    /// Fill a template's shot skeletons with concrete values for an intent.
    pub async fn instantiate_plan(
        &self,
        intent: &Intent,
        template: &Template,
    ) -> MlResult<ShotPlan> {
        let request = InstantiatePlanRequest { intent, template };
        let body = self.post_for_body("/v1/plan/instantiate", &request).await?;

        let plan: ShotPlan = serde_json::from_str(&body)
            .map_err(|e| MlError::instantiation_error(format!("malformed plan payload: {e}")))?;

        if plan.shots.is_empty() {
            return Err(MlError::instantiation_error("plan has no shots"));
        }

        debug!(
            template_id = ?plan.template_id,
            shot_count = plan.shots.len(),
            "plan instantiated"
        );
        Ok(plan)
    }

    /// Turn revision feedback into targeted fields plus suggested changes.
    ///
    /// Fields the revision flow does not know how to apply are dropped from
    /// the response. Callers handle total parse failure with
    /// [`FeedbackDelta::fallback`].
    pub async fn parse_feedback(&self, feedback: &str, intent: &Intent) -> MlResult<FeedbackDelta> {
        let request = ParseFeedbackRequest { feedback, intent };
        let body = self.post_for_body("/v1/feedback/parse", &request).await?;

        let mut delta: FeedbackDelta = serde_json::from_str(&body)
            .map_err(|e| MlError::parse_error(format!("malformed feedback payload: {e}")))?;

        let before = delta.targeted_fields.len();
        delta
            .targeted_fields
            .retain(|f| TARGETABLE_FIELDS.contains(&f.as_str()));
        if delta.targeted_fields.len() < before {
            warn!(
                dropped = before - delta.targeted_fields.len(),
                "feedback response named unknown fields"
            );
        }

        Ok(delta)
    }

    /// Embed texts for semantic matching.
    ///
    /// One vector per input text, in input order.
    pub async fn embed(&self, texts: &[String]) -> MlResult<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest { texts };
        let body = self.post_for_body("/v1/embeddings", &request).await?;

        let response: EmbeddingsResponse = serde_json::from_str(&body)
            .map_err(|e| MlError::InvalidResponse(format!("malformed embeddings payload: {e}")))?;

        if response.vectors.len() != texts.len() {
            return Err(MlError::InvalidResponse(format!(
                "expected {} vectors, got {}",
                texts.len(),
                response.vectors.len()
            )));
        }

        Ok(response.vectors)
    }

    async fn post_for_body<B: Serialize>(&self, path: &str, body: &B) -> MlResult<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MlError::ServiceError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.text().await?)
    }
}
