//! Keyword-gated story engine.
//!
//! [`StoryService`] is the public surface: it builds a story from a
//! worm's identity text (outline, background material, coverage patch,
//! persist), then drives the reveal process as the worm accumulates and
//! speaks keywords. Generation is idempotent per worm; a stale outline
//! (template no longer resolves) silently self-heals.

pub mod material;
pub mod outline;
pub mod prompts;
pub mod types;

pub use outline::{OutlineDraft, SegmentDraft};
pub use types::{
    normalize_word, SegmentView, StoryFragment, StoryOutline, StorySegment, StoryTemplate,
    StoryView, StreamFragment, UnlockOutcome, WormId, TOTAL_SEGMENTS,
};

use crate::cache::unix_millis;
use crate::generate::Generator;
use crate::store::{StoreError, StoryStore};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Errors from story generation and unlock handling. Everything here
/// maps to the caller's single generic "try again" category.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("invalid outline: {0}")]
    InvalidOutline(String),

    #[error("insufficient background material: got {got} passages")]
    InsufficientMaterial { got: usize },

    #[error("story generation already in progress for this worm")]
    GenerationInProgress,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// The story engine. One instance per process, shared behind an `Arc`.
pub struct StoryService {
    generator: Arc<Generator>,
    store: Arc<dyn StoryStore>,
    in_flight: Arc<Mutex<HashSet<WormId>>>,
}

/// Releases the per-worm generation claim on drop, including on the
/// error paths out of the pipeline.
struct Claim {
    in_flight: Arc<Mutex<HashSet<WormId>>>,
    worm_id: WormId,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&self.worm_id);
    }
}

impl StoryService {
    pub fn new(generator: Arc<Generator>, store: Arc<dyn StoryStore>) -> Self {
        Self {
            generator,
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Build (or return the existing) story for a worm.
    ///
    /// Idempotent: an existing outline whose template resolves is
    /// returned as-is with the same story id. A stale outline is deleted
    /// and generation retried transparently. Two concurrent calls for
    /// one worm cannot both generate; the loser fails fast with
    /// [`StoryError::GenerationInProgress`].
    pub async fn generate_story(
        &self,
        worm_id: WormId,
        identity: &str,
    ) -> Result<StoryView, StoryError> {
        if let Some(view) = self.existing_view(worm_id).await? {
            return Ok(view);
        }

        let _claim = self.claim(worm_id)?;

        // Someone may have finished generating between the check above
        // and taking the claim.
        if let Some(view) = self.existing_view(worm_id).await? {
            return Ok(view);
        }

        let draft = outline::build_outline(&self.generator, identity).await?;
        let (background_texts, stream_fragments) =
            material::build_material(&self.generator, &draft).await?;

        let template = StoryTemplate {
            id: Uuid::new_v4(),
            title: draft.title,
            tagline: draft.tagline,
            setting: draft.setting,
            background_texts,
            stream_fragments,
            segments: draft
                .segments
                .into_iter()
                .enumerate()
                .map(|(index, s)| StorySegment {
                    index,
                    keywords: s.keywords,
                    hint: s.hint,
                    narrative: s.narrative,
                })
                .collect(),
        };
        let story_outline = StoryOutline {
            id: Uuid::new_v4(),
            worm_id,
            template_id: template.id,
            total_segments: template.segments.len(),
            created_at: unix_millis(),
            completed_at: None,
        };

        // Template first: an outline must never point at a template that
        // was not written.
        self.store.save_template(&template).await?;
        self.store.save_outline(&story_outline).await?;

        info!(%worm_id, story_id = %story_outline.id, title = %template.title, "story generated");
        self.view(&story_outline, &template).await
    }

    /// Evaluate one utterance against the worm's story.
    ///
    /// Records newly spoken keywords, then reveals at most the first
    /// locked segment whose every keyword has been both consumed and
    /// spoken.
    pub async fn check_unlock(
        &self,
        worm_id: WormId,
        words: &[String],
    ) -> Result<UnlockOutcome, StoryError> {
        let Some(story_outline) = self.store.get_outline(worm_id).await? else {
            return Ok(UnlockOutcome::no_story());
        };
        let Some(template) = self.store.get_template(story_outline.template_id).await? else {
            self.heal_stale(&story_outline).await?;
            return Ok(UnlockOutcome::no_story());
        };

        let all_keywords: HashSet<&str> = template
            .segments
            .iter()
            .flat_map(|s| s.keywords.iter().map(String::as_str))
            .collect();

        for word in words {
            let normalized = normalize_word(word);
            if !normalized.is_empty() && all_keywords.contains(normalized.as_str()) {
                self.store.mark_keyword_spoken(worm_id, &normalized).await?;
            }
        }

        let vocabulary = self.store.get_vocabulary(worm_id).await?;
        let spoken = self.store.get_spoken_keywords(worm_id).await?;
        let fragments = self.store.get_fragments(story_outline.id).await?;
        let revealed: HashSet<usize> = fragments.iter().map(|f| f.segment_index).collect();

        let total_segments = story_outline.total_segments;
        let mut revealed_count = revealed.len();
        let mut unlocked_segment: Option<SegmentView> = None;

        // At most one transition per evaluation, scanning in index order.
        for segment in &template.segments {
            if revealed.contains(&segment.index) {
                continue;
            }
            let satisfied = segment
                .keywords
                .iter()
                .all(|k| vocabulary.contains(k) && spoken.contains(k));
            if !satisfied {
                continue;
            }

            self.store
                .save_fragment(&StoryFragment {
                    story_id: story_outline.id,
                    worm_id,
                    segment_index: segment.index,
                    narrative: segment.narrative.clone(),
                    created_at: unix_millis(),
                })
                .await?;
            revealed_count += 1;
            info!(%worm_id, segment = segment.index, "segment revealed");
            unlocked_segment = Some(SegmentView {
                index: segment.index,
                keywords: segment.keywords.clone(),
                hint: segment.hint.clone(),
                narrative: Some(segment.narrative.clone()),
            });
            break;
        }

        let is_complete = revealed_count == total_segments;
        if is_complete && unlocked_segment.is_some() {
            self.store.mark_complete(story_outline.id).await?;
            info!(%worm_id, story_id = %story_outline.id, "story complete");
        }

        Ok(UnlockOutcome {
            unlocked: unlocked_segment.is_some(),
            segment: unlocked_segment,
            revealed_count,
            total_segments,
            is_complete,
        })
    }

    /// Current story view for a worm, or `None` when it has no story.
    /// A stale outline reads as `None`; the next `generate_story` call
    /// heals it.
    pub async fn get_story_state(
        &self,
        worm_id: WormId,
    ) -> Result<Option<StoryView>, StoryError> {
        self.existing_view(worm_id).await
    }

    async fn existing_view(&self, worm_id: WormId) -> Result<Option<StoryView>, StoryError> {
        let Some(story_outline) = self.store.get_outline(worm_id).await? else {
            return Ok(None);
        };
        match self.store.get_template(story_outline.template_id).await? {
            Some(template) => Ok(Some(self.view(&story_outline, &template).await?)),
            None => {
                self.heal_stale(&story_outline).await?;
                Ok(None)
            }
        }
    }

    /// Remove a stale outline along with the dead story's fragments.
    async fn heal_stale(&self, story_outline: &StoryOutline) -> Result<(), StoryError> {
        warn!(
            worm_id = %story_outline.worm_id,
            template_id = %story_outline.template_id,
            "stale outline, deleting"
        );
        self.store.delete_fragments(story_outline.id).await?;
        self.store.delete_outline(story_outline.worm_id).await?;
        Ok(())
    }

    async fn view(
        &self,
        story_outline: &StoryOutline,
        template: &StoryTemplate,
    ) -> Result<StoryView, StoryError> {
        let fragments = self.store.get_fragments(story_outline.id).await?;
        let revealed: HashSet<usize> = fragments.iter().map(|f| f.segment_index).collect();

        let segments: Vec<SegmentView> = template
            .segments
            .iter()
            .map(|s| SegmentView {
                index: s.index,
                keywords: s.keywords.clone(),
                hint: s.hint.clone(),
                narrative: revealed.contains(&s.index).then(|| s.narrative.clone()),
            })
            .collect();

        let revealed_count = revealed.len();
        Ok(StoryView {
            story_id: story_outline.id,
            title: template.title.clone(),
            tagline: template.tagline.clone(),
            setting: template.setting.clone(),
            background_texts: template.background_texts.clone(),
            stream_fragments: template.stream_fragments.clone(),
            segments,
            revealed_count,
            total_segments: story_outline.total_segments,
            is_complete: story_outline.completed_at.is_some()
                || revealed_count == story_outline.total_segments,
        })
    }

    fn claim(&self, worm_id: WormId) -> Result<Claim, StoryError> {
        let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
        if !in_flight.insert(worm_id) {
            return Err(StoryError::GenerationInProgress);
        }
        Ok(Claim {
            in_flight: Arc::clone(&self.in_flight),
            worm_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_and_released_on_drop() {
        let store: Arc<dyn StoryStore> = Arc::new(crate::store::MemoryStore::new());
        let generator = Arc::new(Generator::new(Arc::new(crate::store::MemoryStore::new())));
        let service = StoryService::new(generator, store);
        let worm_id = Uuid::new_v4();

        let claim = service.claim(worm_id).expect("first claim");
        assert!(matches!(
            service.claim(worm_id),
            Err(StoryError::GenerationInProgress)
        ));

        drop(claim);
        assert!(service.claim(worm_id).is_ok());
    }
}
