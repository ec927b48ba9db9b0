//! Phases 2-4: background material, stream fragments, and the keyword
//! coverage patcher.
//!
//! Background passages carry the unlock contract: every outline keyword
//! must appear in at least two passages, otherwise a segment could never
//! be satisfied by vocabulary alone. Stream fragments are pure ambience
//! and degrade to a literal fallback list instead of failing.

use super::outline::OutlineDraft;
use super::prompts;
use super::types::StreamFragment;
use super::StoryError;
use crate::cache::unix_millis;
use crate::extract::first_json_array;
use crate::generate::{Generator, ModelTier};
use tracing::debug;
use uuid::Uuid;

/// Below this many parsed background passages the story cannot be built.
const MIN_BACKGROUNDS: usize = 5;

/// Below this many parsed stream fragments the literal fallback is used.
const MIN_STREAMS: usize = 5;

/// Minimum passages each keyword must appear in, whole-word.
const MIN_COVERAGE: usize = 2;

const STREAM_FALLBACK: &[&str] = &[
    "Somewhere, a kettle has been whistling for an hour.",
    "The frequency drifts; a voice counts backwards from ten.",
    "Static, then three notes of a song nobody wrote.",
    "A weather report for a town that is not on any map.",
    "The broadcast ends the way it began: mid-sentence.",
];

const PATCH_TEMPLATES: &[&str] = &[
    "The journal keeps returning to the word {}, underlined twice.",
    "In the margin someone has written {} and nothing else.",
    "One entry is just a sketch, captioned with the single word {}.",
    "Later pages mention {} again, as if it explained everything.",
];

/// Run phases 2-4 for a validated outline. The two generation calls are
/// issued concurrently to cut wall-clock latency.
pub async fn build_material(
    generator: &Generator,
    outline: &OutlineDraft,
) -> Result<(Vec<String>, Vec<StreamFragment>), StoryError> {
    let background_prompt = prompts::background_prompt(outline);
    let stream_prompt = prompts::stream_prompt(outline);

    let (background_raw, stream_raw) = futures::join!(
        generator.generate(&background_prompt, "story_background", ModelTier::Advanced),
        generator.generate(&stream_prompt, "story_stream", ModelTier::Advanced),
    );

    let mut backgrounds = parse_string_array(&background_raw);
    if backgrounds.len() < MIN_BACKGROUNDS {
        return Err(StoryError::InsufficientMaterial {
            got: backgrounds.len(),
        });
    }

    let streams = parse_string_array(&stream_raw);
    let fragments = if streams.len() < MIN_STREAMS {
        debug!(got = streams.len(), "stream generation under-delivered, using fallback");
        STREAM_FALLBACK
            .iter()
            .map(|text| make_fragment(text, "fallback"))
            .collect()
    } else {
        streams
            .iter()
            .map(|text| make_fragment(text, "generated"))
            .collect()
    };

    patch_coverage(&mut backgrounds, &outline.all_keywords());

    Ok((backgrounds, fragments))
}

fn make_fragment(text: &str, source: &str) -> StreamFragment {
    StreamFragment {
        id: Uuid::new_v4(),
        text: text.to_string(),
        source: source.to_string(),
        timestamp: unix_millis(),
    }
}

/// Extract the first balanced array and keep its string elements,
/// tolerating stray non-string entries the model may emit.
fn parse_string_array(raw: &str) -> Vec<String> {
    let Some(json) = first_json_array(raw) else {
        return Vec::new();
    };
    let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(json) else {
        return Vec::new();
    };
    values
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        })
        .collect()
}

/// Guarantee every keyword appears, whole-word and case-insensitive, in
/// at least [`MIN_COVERAGE`] passages, appending templated filler when
/// generation under-delivers.
pub fn patch_coverage(passages: &mut Vec<String>, keywords: &[String]) {
    for (i, keyword) in keywords.iter().enumerate() {
        let mut count = passages
            .iter()
            .filter(|p| contains_word(p, keyword))
            .count();
        while count < MIN_COVERAGE {
            let template = PATCH_TEMPLATES[(i + count) % PATCH_TEMPLATES.len()];
            passages.push(template.replacen("{}", keyword, 1));
            count += 1;
        }
    }
}

/// Whole-word, case-insensitive containment.
pub fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|token| token.eq_ignore_ascii_case(word))
}
