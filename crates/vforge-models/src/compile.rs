//! Request compilation: shots to fully-specified generation calls.

use rand::Rng;

use crate::intent::Intent;
use crate::plan::{Shot, ShotPlan, SubtitlePolicy};
use crate::policy::{SEED_MAX, SEED_MIN};
use crate::quality::QualityMode;
use crate::request::{to_wire_size, GenerationParams, ShotRequest};
use crate::template::Template;

/// Negative terms appended whenever the subtitle policy is `none`.
const SUBTITLE_SUPPRESSION_TERMS: &str =
    "subtitles, captions, text overlay, watermark, logo";

/// Standing quality terms appended to every negative prompt.
const QUALITY_TERMS: &str = "low quality, blurry, out of focus, deformed";

/// Failure modes specific to multi-shot generation.
const SCENARIO_TERMS: &str =
    "distortion, artifacts, flickering, inconsistent characters";

/// Draw a generation seed.
pub fn draw_seed() -> i64 {
    rand::rng().random_range(SEED_MIN..SEED_MAX)
}

/// Compile one request per (shot, candidate seed).
///
/// `candidates` is the quality mode's preview-seed count; each candidate
/// for a shot gets its own freshly drawn seed. Requests are immutable from
/// here on.
pub fn compile_requests(
    intent: &Intent,
    plan: &ShotPlan,
    template: &Template,
    model: &str,
    resolution: &str,
    candidates: u32,
) -> Vec<ShotRequest> {
    plan.shots
        .iter()
        .flat_map(|shot| {
            (0..candidates.max(1)).map(|_| {
                compile_shot(intent, plan, template, shot, model, resolution, draw_seed())
            })
        })
        .collect()
}

/// Compile a single shot with a pinned seed.
pub fn compile_shot(
    intent: &Intent,
    plan: &ShotPlan,
    template: &Template,
    shot: &Shot,
    model: &str,
    resolution: &str,
    seed: i64,
) -> ShotRequest {
    ShotRequest {
        shot_id: shot.shot_id,
        compiled_prompt: build_prompt(intent, plan, shot),
        compiled_negative_prompt: build_negative_prompt(template, plan.policy()),
        params: GenerationParams {
            model: model.to_string(),
            size: to_wire_size(resolution),
            duration: shot.duration_s.round().max(1.0) as u32,
            seed,
            prompt_extend: true,
            watermark: template.constraints.watermark_default,
        },
    }
}

/// Four-section prompt: global requirements, this shot's script line with
/// its absolute time range, audio direction, and consistency notes.
fn build_prompt(intent: &Intent, plan: &ShotPlan, shot: &Shot) -> String {
    let mut sections = Vec::with_capacity(4);

    // 1. Global requirements
    let mut global = String::from("Global requirements: ");
    if !intent.optimized_prompt.is_empty() {
        global.push_str(&intent.optimized_prompt);
    } else {
        global.push_str(&intent.topic);
    }
    if !intent.style.visual.is_empty() {
        global.push_str(&format!("; visual style: {}", intent.style.visual));
    }
    if !intent.style.lighting.is_empty() {
        global.push_str(&format!("; lighting: {}", intent.style.lighting));
    }
    if !intent.style.color_tone.is_empty() {
        global.push_str(&format!("; color tone: {}", intent.style.color_tone));
    }
    if !intent.scene.location.is_empty() {
        global.push_str(&format!("; scene: {}", intent.scene.location));
        if !intent.scene.time_of_day.is_empty() {
            global.push_str(&format!(", {}", intent.scene.time_of_day));
        }
    }
    if !intent.emotion_curve.is_empty() {
        global.push_str(&format!(
            "; emotional arc: {}",
            intent.emotion_curve.join(" -> ")
        ));
    }
    if plan.policy() == SubtitlePolicy::None {
        global.push_str("; absolutely no on-screen text, subtitles or watermarks");
    }
    sections.push(global);

    // 2. Shot script
    let start: f64 = plan
        .shots
        .iter()
        .take_while(|s| s.shot_id != shot.shot_id)
        .map(|s| s.duration_s)
        .sum();
    let end = start + shot.duration_s;
    let mut script = format!(
        "Shot script [{:.1}-{:.1}s]: {}",
        start, end, shot.visual
    );
    if !shot.camera.is_empty() {
        script.push_str(&format!("; camera: {}", shot.camera));
    }
    if !shot.camera_motion.is_empty() {
        script.push_str(&format!("; motion: {}", shot.camera_motion));
    }
    sections.push(script);

    // 3. Audio
    let mut audio = String::from("Audio: ");
    if !shot.audio.sfx.is_empty() {
        audio.push_str(&shot.audio.sfx);
    }
    let narration = compress_narration(&shot.audio.narration, intent.quality_mode);
    if !narration.is_empty() {
        if !shot.audio.sfx.is_empty() {
            audio.push_str("; ");
        }
        audio.push_str(&format!("narration ({})", narration_voice(intent)));
        audio.push_str(&format!(": \"{}\"", narration));
    }
    if audio.len() > "Audio: ".len() {
        sections.push(audio);
    }

    // 4. Consistency
    let mut consistency =
        String::from("Consistency: keep palette, wardrobe and props identical across shots");
    if !intent.characters.is_empty() {
        let names: Vec<&str> = intent.characters.iter().map(|c| c.name.as_str()).collect();
        consistency.push_str(&format!("; recurring characters: {}", names.join(", ")));
    }
    sections.push(consistency);

    sections.join("\n")
}

fn narration_voice(intent: &Intent) -> String {
    match (
        intent.audio.narration_language.is_empty(),
        intent.audio.narration_tone.is_empty(),
    ) {
        (false, false) => format!(
            "{}, {}",
            intent.audio.narration_language, intent.audio.narration_tone
        ),
        (false, true) => intent.audio.narration_language.clone(),
        (true, false) => intent.audio.narration_tone.clone(),
        (true, true) => "neutral".to_string(),
    }
}

/// Trim narration to the mode's word budget, keeping leading words.
pub fn compress_narration(narration: &str, mode: QualityMode) -> String {
    let narration = narration.trim();
    match mode.narration_word_budget() {
        None => narration.to_string(),
        Some(budget) => {
            let words: Vec<&str> = narration.split_whitespace().collect();
            if words.len() <= budget {
                narration.to_string()
            } else {
                words[..budget].join(" ")
            }
        }
    }
}

/// Base negative prompt + policy terms + standing quality/scenario terms.
fn build_negative_prompt(template: &Template, policy: SubtitlePolicy) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !template.negative_prompt_base.is_empty() {
        parts.push(&template.negative_prompt_base);
    }
    if policy == SubtitlePolicy::None {
        parts.push(SUBTITLE_SUPPRESSION_TERMS);
    }
    parts.push(QUALITY_TERMS);
    parts.push(SCENARIO_TERMS);
    parts.join(", ")
}
