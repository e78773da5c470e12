//! Hybrid semantic + lexical template matching.
//!
//! With an embedding service available, templates and the intent are
//! flattened to search documents, embedded, and ranked by a blend of
//! cosine similarity and tag-set overlap. Without one (or when the call
//! fails) a purely lexical score over topic, emotion and style tags takes
//! over. Either way a best match below the confidence floor is no match:
//! callers surface that as a clarification request.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use vforge_ml_client::{MlError, MlResult};
use vforge_models::{Intent, Template};

use crate::catalog::TemplateCatalog;
use crate::services::Embedder;

/// Semantic candidates re-ranked by the tag-overlap blend.
const TOP_K: usize = 3;

/// Cosine weight in the semantic blend; the rest is tag overlap.
const SEMANTIC_WEIGHT: f64 = 0.7;
const OVERLAP_WEIGHT: f64 = 0.3;

/// Lexical component weights.
const TOPIC_WEIGHT: f64 = 0.6;
const EMOTION_WEIGHT: f64 = 0.2;
const STYLE_WEIGHT: f64 = 0.2;

/// How a match was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Semantic,
    Lexical,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Semantic => "semantic",
            MatchStrategy::Lexical => "lexical",
        }
    }
}

/// A template selected for an intent.
#[derive(Debug, Clone)]
pub struct TemplateMatch {
    pub template: Template,
    pub confidence: f64,
    pub strategy: MatchStrategy,
}

/// Ranks catalog templates against an intent.
pub struct TemplateMatcher {
    embedder: Option<Arc<dyn Embedder>>,
    min_confidence: f64,
}

impl TemplateMatcher {
    /// Lexical-only matcher.
    pub fn new(min_confidence: f64) -> Self {
        Self {
            embedder: None,
            min_confidence,
        }
    }

    /// Matcher that prefers the semantic path.
    pub fn with_embedder(embedder: Arc<dyn Embedder>, min_confidence: f64) -> Self {
        Self {
            embedder: Some(embedder),
            min_confidence,
        }
    }

    /// Pick the best template for `intent`, or `None` when nothing clears
    /// the confidence floor.
    ///
    /// Deterministic for a fixed catalog and intent: score ties break on
    /// template id.
    pub async fn match_intent(
        &self,
        intent: &Intent,
        catalog: &TemplateCatalog,
    ) -> Option<TemplateMatch> {
        if catalog.is_empty() {
            return None;
        }

        if let Some(embedder) = &self.embedder {
            match self.semantic_match(embedder.as_ref(), intent, catalog).await {
                Ok(result) => return result,
                Err(e) => {
                    warn!(error = %e, "embedding failed, falling back to lexical matching");
                }
            }
        }

        self.lexical_match(intent, catalog)
    }

    async fn semantic_match(
        &self,
        embedder: &dyn Embedder,
        intent: &Intent,
        catalog: &TemplateCatalog,
    ) -> MlResult<Option<TemplateMatch>> {
        let mut texts = Vec::with_capacity(catalog.len() + 1);
        texts.push(intent_document(intent));
        for template in catalog.all() {
            texts.push(template_document(template));
        }

        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(MlError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let query = l2_normalize(&vectors[0]);
        let mut by_distance: Vec<(f64, &Template)> = catalog
            .all()
            .iter()
            .zip(vectors[1..].iter())
            .map(|(template, vector)| {
                let doc = l2_normalize(vector);
                (squared_distance(&query, &doc), template)
            })
            .collect();
        by_distance.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.template_id.as_str().cmp(b.1.template_id.as_str()))
        });

        let intent_tags = intent_tag_set(intent);
        let mut candidates: Vec<(f64, &Template)> = by_distance
            .into_iter()
            .take(TOP_K)
            .map(|(distance, template)| {
                // Normalized vectors make squared distance a cosine in
                // disguise: d^2 = 2 - 2cos.
                let cosine = (1.0 - distance / 2.0).clamp(0.0, 1.0);
                let overlap = jaccard(&intent_tags, &template_tag_set(template));
                let confidence = SEMANTIC_WEIGHT * cosine + OVERLAP_WEIGHT * overlap;
                debug!(
                    template_id = %template.template_id,
                    cosine,
                    overlap,
                    confidence,
                    "semantic candidate"
                );
                (confidence, template)
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.template_id.as_str().cmp(b.1.template_id.as_str()))
        });

        Ok(candidates
            .into_iter()
            .next()
            .filter(|(confidence, _)| *confidence >= self.min_confidence)
            .map(|(confidence, template)| TemplateMatch {
                template: template.clone(),
                confidence,
                strategy: MatchStrategy::Semantic,
            }))
    }

    fn lexical_match(&self, intent: &Intent, catalog: &TemplateCatalog) -> Option<TemplateMatch> {
        let intent_topic = normalize_tag(&intent.topic);
        let intent_topic_tokens = tokenize(&intent.topic);
        let intent_emotions: HashSet<String> = intent
            .emotion_curve
            .iter()
            .map(|e| normalize_tag(e))
            .filter(|e| !e.is_empty())
            .collect();
        let intent_styles: HashSet<String> = [
            &intent.style.visual,
            &intent.style.color_tone,
            &intent.style.lighting,
        ]
        .into_iter()
        .map(|s| normalize_tag(s))
        .filter(|s| !s.is_empty())
        .collect();

        let mut candidates: Vec<(f64, &Template)> = Vec::new();
        for template in catalog.all() {
            let topic_norms: HashSet<String> = template
                .tags
                .topic
                .iter()
                .map(|t| normalize_tag(t))
                .collect();
            let topic_score = if !intent_topic.is_empty() && topic_norms.contains(&intent_topic) {
                1.0
            } else {
                let mut template_tokens: HashSet<String> = HashSet::new();
                for tag in &template.tags.topic {
                    template_tokens.extend(tokenize(tag));
                }
                let denom = intent_topic_tokens.len().max(template_tokens.len());
                if denom == 0 {
                    0.0
                } else {
                    let overlap = intent_topic_tokens.intersection(&template_tokens).count();
                    overlap as f64 / denom as f64
                }
            };

            let template_emotions: HashSet<String> = template
                .tags
                .emotion
                .iter()
                .map(|e| normalize_tag(e))
                .collect();
            let emotion_score = intent_emotions.intersection(&template_emotions).count() as f64
                / intent_emotions.len().max(1) as f64;

            let template_styles: HashSet<String> = template
                .tags
                .style
                .iter()
                .map(|s| normalize_tag(s))
                .collect();
            let style_score = intent_styles.intersection(&template_styles).count() as f64
                / intent_styles.len().max(1) as f64;

            let confidence =
                TOPIC_WEIGHT * topic_score + EMOTION_WEIGHT * emotion_score + STYLE_WEIGHT * style_score;
            if confidence < self.min_confidence {
                continue;
            }
            candidates.push((confidence, template));
        }

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.template_id.as_str().cmp(b.1.template_id.as_str()))
        });

        candidates
            .into_iter()
            .next()
            .map(|(confidence, template)| TemplateMatch {
                template: template.clone(),
                confidence,
                strategy: MatchStrategy::Lexical,
            })
    }
}

/// Flatten a template into its search document.
fn template_document(template: &Template) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.extend(template.tags.topic.iter().cloned());
    parts.extend(template.tags.tone.iter().cloned());
    parts.extend(template.tags.style.iter().cloned());
    parts.extend(template.tags.emotion.iter().cloned());
    parts.push(template.template_id.as_str().to_string());
    parts.push(template.template_id.as_str().replace('_', " "));
    if template.constraints.watermark_default {
        parts.push("watermark".to_string());
    }
    parts.retain(|p| !p.trim().is_empty());
    parts.join(" ")
}

/// Flatten an intent into its query document.
///
/// The topic is carried both verbatim and with its separators swapped so
/// an underscored topic still meets a spaced tag and vice versa.
fn intent_document(intent: &Intent) -> String {
    let mut parts: Vec<String> = vec![intent.topic.clone()];
    if intent.topic.contains('_') {
        parts.push(intent.topic.replace('_', " "));
    } else if intent.topic.contains(' ') {
        parts.push(intent.topic.replace(' ', "_"));
    }
    parts.push(intent.intent.clone());
    parts.push(intent.style.visual.clone());
    parts.push(intent.style.color_tone.clone());
    parts.push(intent.style.lighting.clone());
    parts.push(intent.scene.location.clone());
    parts.push(intent.scene.time_of_day.clone());
    parts.push(intent.scene.weather.clone());
    parts.extend(intent.emotion_curve.iter().cloned());
    parts.retain(|p| !p.trim().is_empty());
    parts.join(" ")
}

fn intent_tag_set(intent: &Intent) -> HashSet<String> {
    let mut tags: Vec<String> = vec![
        normalize_tag(&intent.topic),
        normalize_tag(&intent.style.visual),
        normalize_tag(&intent.style.color_tone),
        normalize_tag(&intent.style.lighting),
        normalize_tag(&intent.scene.location),
        normalize_tag(&intent.scene.time_of_day),
        normalize_tag(&intent.scene.weather),
    ];
    tags.extend(intent.emotion_curve.iter().map(|e| normalize_tag(e)));
    tags.into_iter().filter(|t| !t.is_empty()).collect()
}

fn template_tag_set(template: &Template) -> HashSet<String> {
    let tags = &template.tags;
    let mut set: HashSet<String> = HashSet::new();
    for tag in tags
        .topic
        .iter()
        .chain(tags.tone.iter())
        .chain(tags.style.iter())
        .chain(tags.emotion.iter())
    {
        let norm = normalize_tag(tag);
        if !norm.is_empty() {
            set.insert(norm);
        }
    }
    if let Some(policy) = tags.subtitle_policy {
        set.insert(policy.as_str().to_string());
    }
    set
}

/// Collapse a tag to its comparison form: lowercase with every space and
/// underscore removed ("Sleep Hygiene" and "sleep_hygiene" both become
/// "sleephygiene").
fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect()
}

/// Lowercased word set of a phrase; punctuation splits, separators drop.
fn tokenize(phrase: &str) -> HashSet<String> {
    phrase
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split(|c: char| c.is_whitespace() || c == '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (x - y) as f64;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vforge_models::{
        AudioTemplate, ShotSkeleton, SkeletonRole, TemplateConstraints, TemplateId, TemplateTags,
    };

    fn template(id: &str, topics: &[&str], emotions: &[&str], styles: &[&str]) -> Template {
        Template {
            template_id: TemplateId::from_string(id),
            version: "1.0.0".to_string(),
            tags: TemplateTags {
                topic: topics.iter().map(|s| s.to_string()).collect(),
                tone: vec!["calm".to_string()],
                style: styles.iter().map(|s| s.to_string()).collect(),
                emotion: emotions.iter().map(|s| s.to_string()).collect(),
                subtitle_policy: None,
            },
            constraints: TemplateConstraints {
                duration_s_range: [10.0, 30.0],
                allowed_sizes: vec!["1280*720".to_string()],
                fps: 24,
                watermark_default: false,
            },
            shot_skeletons: vec![ShotSkeleton {
                shot_id: 1,
                role: SkeletonRole::Hook,
                duration_s: 5.0,
                camera: String::new(),
                visual_template: String::new(),
                audio_template: AudioTemplate::default(),
                subtitle_policy: None,
            }],
            negative_prompt_base: "text".to_string(),
        }
    }

    fn sleep_intent() -> Intent {
        let mut intent = Intent::new("sleep hygiene", 15.0);
        intent.style.visual = "soft light".to_string();
        intent.emotion_curve = vec!["calm".to_string()];
        intent
    }

    fn catalog() -> TemplateCatalog {
        TemplateCatalog::from_templates(vec![
            template(
                "sleep_wind_down",
                &["sleep hygiene", "insomnia"],
                &["calm"],
                &["soft light"],
            ),
            template(
                "coffee_focus",
                &["morning energy"],
                &["energetic"],
                &["bright"],
            ),
        ])
    }

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> MlResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("sleep") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _texts: &[String]) -> MlResult<Vec<Vec<f32>>> {
            Err(MlError::InvalidResponse("embedding service down".to_string()))
        }
    }

    /// Query orthogonal to every document.
    struct DisagreeingEmbedder;

    #[async_trait]
    impl Embedder for DisagreeingEmbedder {
        async fn embed(&self, texts: &[String]) -> MlResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .enumerate()
                .map(|(i, _)| if i == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }
    }

    #[test]
    fn test_normalize_tag_drops_separators() {
        assert_eq!(normalize_tag("Sleep Hygiene"), "sleephygiene");
        assert_eq!(normalize_tag("sleep_hygiene"), "sleephygiene");
        assert_eq!(normalize_tag("  CALM  "), "calm");
        assert_eq!(normalize_tag(""), "");
    }

    #[test]
    fn test_tokenize_splits_on_punctuation_and_separators() {
        let tokens = tokenize("sleep-hygiene, deep_rest");
        let expected: HashSet<String> = ["sleep", "hygiene", "deep", "rest"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_jaccard_empty_side_scores_zero() {
        let some: HashSet<String> = ["a".to_string()].into_iter().collect();
        assert_eq!(jaccard(&HashSet::new(), &some), 0.0);
        assert_eq!(jaccard(&some, &HashSet::new()), 0.0);
    }

    #[tokio::test]
    async fn test_lexical_exact_topic_match() {
        let matcher = TemplateMatcher::new(0.5);
        let matched = matcher
            .match_intent(&sleep_intent(), &catalog())
            .await
            .unwrap();
        assert_eq!(matched.template.template_id.as_str(), "sleep_wind_down");
        assert_eq!(matched.strategy, MatchStrategy::Lexical);
        // 0.6 topic + 0.2 emotion + 0.2 style, all exact.
        assert!((matched.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_lexical_below_floor_is_no_match() {
        let matcher = TemplateMatcher::new(0.5);
        let intent = Intent::new("quantum chromodynamics", 15.0);
        assert!(matcher.match_intent(&intent, &catalog()).await.is_none());
    }

    #[tokio::test]
    async fn test_semantic_match_blends_cosine_and_overlap() {
        let matcher = TemplateMatcher::with_embedder(Arc::new(FakeEmbedder), 0.5);
        let matched = matcher
            .match_intent(&sleep_intent(), &catalog())
            .await
            .unwrap();
        assert_eq!(matched.template.template_id.as_str(), "sleep_wind_down");
        assert_eq!(matched.strategy, MatchStrategy::Semantic);
        assert!(matched.confidence > 0.7);
    }

    #[tokio::test]
    async fn test_semantic_below_floor_does_not_fall_back() {
        // The embedder answers, the answer just is not similar. A weak
        // semantic result means clarification, not a lexical retry, even
        // when the lexical score would have cleared the floor.
        let intent = Intent::new("morning energy", 15.0);

        let lexical = TemplateMatcher::new(0.5);
        assert!(lexical.match_intent(&intent, &catalog()).await.is_some());

        let semantic = TemplateMatcher::with_embedder(Arc::new(DisagreeingEmbedder), 0.5);
        assert!(semantic.match_intent(&intent, &catalog()).await.is_none());
    }

    #[tokio::test]
    async fn test_embed_failure_falls_back_to_lexical() {
        let matcher = TemplateMatcher::with_embedder(Arc::new(BrokenEmbedder), 0.5);
        let matched = matcher
            .match_intent(&sleep_intent(), &catalog())
            .await
            .unwrap();
        assert_eq!(matched.strategy, MatchStrategy::Lexical);
        assert_eq!(matched.template.template_id.as_str(), "sleep_wind_down");
    }

    #[tokio::test]
    async fn test_empty_catalog_never_matches() {
        let matcher = TemplateMatcher::new(0.5);
        let empty = TemplateCatalog::from_templates(Vec::new());
        assert!(matcher.match_intent(&sleep_intent(), &empty).await.is_none());
    }

    #[tokio::test]
    async fn test_match_is_deterministic_for_fixed_inputs() {
        let catalog = catalog();
        for matcher in [
            TemplateMatcher::new(0.5),
            TemplateMatcher::with_embedder(Arc::new(FakeEmbedder), 0.5),
        ] {
            let first = matcher
                .match_intent(&sleep_intent(), &catalog)
                .await
                .unwrap();
            let second = matcher
                .match_intent(&sleep_intent(), &catalog)
                .await
                .unwrap();
            assert_eq!(first.template.template_id, second.template.template_id);
            assert_eq!(first.confidence, second.confidence);
            assert_eq!(first.strategy, second.strategy);
        }
    }
}
