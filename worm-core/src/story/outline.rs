//! Phase 1: build and validate the story outline.

use super::prompts;
use super::types::{normalize_word, TOTAL_SEGMENTS};
use super::StoryError;
use crate::extract::first_json_object;
use crate::generate::{Generator, ModelTier};
use serde::Deserialize;

/// A parsed, validated outline, not yet persisted.
#[derive(Debug, Clone)]
pub struct OutlineDraft {
    pub title: String,
    pub tagline: String,
    pub setting: String,
    /// Exactly [`TOTAL_SEGMENTS`] entries after validation.
    pub segments: Vec<SegmentDraft>,
}

#[derive(Debug, Clone)]
pub struct SegmentDraft {
    pub keywords: Vec<String>,
    pub hint: String,
    pub narrative: String,
}

impl OutlineDraft {
    /// Every keyword across all segments, in segment order.
    pub fn all_keywords(&self) -> Vec<String> {
        self.segments
            .iter()
            .flat_map(|s| s.keywords.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawOutline {
    #[serde(default)]
    title: String,
    #[serde(default)]
    tagline: String,
    #[serde(default)]
    setting: String,
    #[serde(default)]
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    hint: String,
    #[serde(default)]
    narrative: String,
}

/// Request an outline from the model and validate its shape.
///
/// Keyword counts are deliberately NOT validated here; the coverage
/// patcher downstream compensates by density instead of rejecting a
/// usable outline. A segment must keep at least one keyword after
/// normalization, otherwise it could never be gated.
pub async fn build_outline(
    generator: &Generator,
    identity: &str,
) -> Result<OutlineDraft, StoryError> {
    let prompt = prompts::outline_prompt(identity);
    let raw = generator
        .generate(&prompt, "story_outline", ModelTier::Advanced)
        .await;
    parse_outline(&raw)
}

/// Parse model output into a validated draft. Split out so tests can
/// exercise validation without a generator.
pub fn parse_outline(raw: &str) -> Result<OutlineDraft, StoryError> {
    let json = first_json_object(raw)
        .ok_or_else(|| StoryError::InvalidOutline("no JSON object in response".to_string()))?;
    let parsed: RawOutline = serde_json::from_str(json)
        .map_err(|e| StoryError::InvalidOutline(format!("malformed outline JSON: {e}")))?;

    if parsed.title.trim().is_empty() {
        return Err(StoryError::InvalidOutline("missing title".to_string()));
    }
    if parsed.setting.trim().is_empty() {
        return Err(StoryError::InvalidOutline("missing setting".to_string()));
    }
    if parsed.segments.len() < TOTAL_SEGMENTS {
        return Err(StoryError::InvalidOutline(format!(
            "expected {TOTAL_SEGMENTS} segments, got {}",
            parsed.segments.len()
        )));
    }

    // Keywords get the same normalization as vocabulary and utterances,
    // so a model emitting "Ember-Lit" still yields an unlockable gate.
    let segments: Vec<SegmentDraft> = parsed
        .segments
        .into_iter()
        .take(TOTAL_SEGMENTS)
        .map(|s| SegmentDraft {
            keywords: s
                .keywords
                .iter()
                .map(|k| normalize_word(k))
                .filter(|k| !k.is_empty())
                .collect(),
            hint: s.hint,
            narrative: s.narrative,
        })
        .collect();

    if let Some(index) = segments.iter().position(|s| s.keywords.is_empty()) {
        return Err(StoryError::InvalidOutline(format!(
            "segment {index} has no usable keywords"
        )));
    }

    Ok(OutlineDraft {
        title: parsed.title,
        tagline: parsed.tagline,
        setting: parsed.setting,
        segments,
    })
}
