//! Hardcoded last-resort text per generation context.
//!
//! Used only when every provider is down and the cache is empty. The
//! high-frequency contexts pick from short literal lists at random so
//! sustained outages do not leave the worm repeating one filler line.

use rand::seq::SliceRandom;

const FALLBACK_THOUGHTS: &[&str] = &[
    "The words taste different today.",
    "Something is humming under the soil.",
    "I almost remembered a story just now.",
    "Quiet. But a good kind of quiet.",
    "Every letter has a smell, you know.",
];

const FALLBACK_NAMES: &[&str] = &[
    "cipher", "flux", "echo", "null", "void", "spark", "drift", "nexus", "core", "shade",
];

/// Hardcoded default text for `context`.
pub fn fallback_text(context: &str) -> String {
    let mut rng = rand::thread_rng();
    match context {
        "thought" => FALLBACK_THOUGHTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(FALLBACK_THOUGHTS[0])
            .to_string(),
        "name" => FALLBACK_NAMES
            .choose(&mut rng)
            .copied()
            .unwrap_or(FALLBACK_NAMES[0])
            .to_string(),
        "greeting" => "Hello again. I kept your place in the story.".to_string(),
        "story_outline" => "{}".to_string(),
        "story_background" => "[]".to_string(),
        "story_stream" => "[]".to_string(),
        _ => "...".to_string(),
    }
}

/// The literal name list, exposed for tests that assert fallback output.
pub fn fallback_names() -> &'static [&'static str] {
    FALLBACK_NAMES
}
