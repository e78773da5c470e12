//! Wire types for the text-understanding service.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use vforge_models::validate::TARGETABLE_FIELDS;
use vforge_models::{Intent, Template};

#[derive(Debug, Clone, Serialize)]
pub struct ParseIntentRequest<'a> {
    pub text: &'a str,
    pub quality_mode: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstantiatePlanRequest<'a> {
    pub intent: &'a Intent,
    pub template: &'a Template,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseFeedbackRequest<'a> {
    pub feedback: &'a str,
    pub intent: &'a Intent,
}

/// Which parts of a plan a revision should touch, as understood from
/// free-text feedback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackDelta {
    #[serde(default)]
    pub targeted_fields: Vec<String>,
    #[serde(default)]
    pub modifications: HashMap<String, String>,
}

impl FeedbackDelta {
    /// Delta used when feedback cannot be parsed: target everything and
    /// carry the raw feedback through as the only modification.
    pub fn fallback(feedback: &str) -> Self {
        Self {
            targeted_fields: TARGETABLE_FIELDS.iter().map(|f| f.to_string()).collect(),
            modifications: HashMap::from([("feedback".to_string(), feedback.to_string())]),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingsRequest<'a> {
    pub texts: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsResponse {
    pub vectors: Vec<Vec<f32>>,
}
