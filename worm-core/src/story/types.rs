//! Story data model: templates, outlines, fragments, and the views
//! returned to callers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a worm. Supplied by the collaborator that owns worms.
pub type WormId = Uuid;

/// Number of narrative segments in every story.
pub const TOTAL_SEGMENTS: usize = 10;

/// One of ten ordered narrative beats, gated by its keyword set.
///
/// Segments 0-6 carry exactly one keyword and 7-9 exactly two; this is a
/// generation-time contract enforced by the prompt and compensated for by
/// the coverage patcher, not rejected at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorySegment {
    pub index: usize,
    /// Lowercase keywords that must all be consumed and spoken to unlock.
    pub keywords: Vec<String>,
    /// Short teaser shown while the segment is locked.
    pub hint: String,
    /// Full text revealed on unlock.
    pub narrative: String,
}

/// A short ambient "stream" fragment attached to the template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFragment {
    pub id: Uuid,
    pub text: String,
    pub source: String,
    /// Unix milliseconds.
    pub timestamp: u64,
}

/// A fully generated story. Immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryTemplate {
    pub id: Uuid,
    pub title: String,
    pub tagline: String,
    pub setting: String,
    pub background_texts: Vec<String>,
    pub stream_fragments: Vec<StreamFragment>,
    pub segments: Vec<StorySegment>,
}

/// Per-worm pointer at a story template. One per worm at a time; an
/// outline whose template no longer resolves is stale and gets deleted
/// and regenerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryOutline {
    pub id: Uuid,
    pub worm_id: WormId,
    pub template_id: Uuid,
    pub total_segments: usize,
    /// Unix milliseconds.
    pub created_at: u64,
    pub completed_at: Option<u64>,
}

/// A revealed segment. Its existence for a (story, index) pair is the
/// sole signal that the segment is revealed; append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryFragment {
    pub story_id: Uuid,
    pub worm_id: WormId,
    pub segment_index: usize,
    pub narrative: String,
    /// Unix milliseconds.
    pub created_at: u64,
}

/// Per-segment view: narrative is present only once revealed.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentView {
    pub index: usize,
    pub keywords: Vec<String>,
    pub hint: String,
    pub narrative: Option<String>,
}

/// Caller-facing view of a worm's story and reveal state.
#[derive(Debug, Clone, Serialize)]
pub struct StoryView {
    pub story_id: Uuid,
    pub title: String,
    pub tagline: String,
    pub setting: String,
    pub background_texts: Vec<String>,
    pub stream_fragments: Vec<StreamFragment>,
    pub segments: Vec<SegmentView>,
    pub revealed_count: usize,
    pub total_segments: usize,
    pub is_complete: bool,
}

/// Result of one unlock evaluation. At most one segment unlocks per call.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockOutcome {
    pub unlocked: bool,
    pub segment: Option<SegmentView>,
    pub revealed_count: usize,
    pub total_segments: usize,
    pub is_complete: bool,
}

impl UnlockOutcome {
    /// Outcome for a worm with no story at all.
    pub fn no_story() -> Self {
        Self {
            unlocked: false,
            segment: None,
            revealed_count: 0,
            total_segments: 0,
            is_complete: false,
        }
    }
}

/// Normalize a word the way vocabulary and keywords are compared:
/// lowercased, stripped of everything non-alphanumeric.
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}
