//! Persistence adapter for stories, spoken keywords, vocabulary, and
//! cached generation output.
//!
//! Two implementations are provided: an in-process [`MemoryStore`] used by
//! tests and embedders that bring their own durability, and a versioned
//! JSON [`FileStore`] for single-process deployments.

use crate::cache::{unix_millis, ContentCache};
use crate::story::types::{
    normalize_word, StoryFragment, StoryOutline, StoryTemplate, WormId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Cached-generation side of the adapter, consumed by the orchestrator.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// One cached entry for `context`, chosen uniformly at random.
    async fn cached_content(&self, context: &str) -> Option<String>;

    /// Record a successful generation under `context`.
    async fn save_generated_content(&self, context: &str, text: &str);
}

/// Full persistence surface consumed by the story service.
#[async_trait]
pub trait StoryStore: ContentStore {
    async fn save_template(&self, template: &StoryTemplate) -> Result<(), StoreError>;
    async fn get_template(&self, id: Uuid) -> Result<Option<StoryTemplate>, StoreError>;

    async fn save_outline(&self, outline: &StoryOutline) -> Result<(), StoreError>;
    async fn get_outline(&self, worm_id: WormId) -> Result<Option<StoryOutline>, StoreError>;
    async fn delete_outline(&self, worm_id: WormId) -> Result<(), StoreError>;

    /// Stamp the outline identified by `story_id` as completed.
    async fn mark_complete(&self, story_id: Uuid) -> Result<(), StoreError>;

    async fn save_fragment(&self, fragment: &StoryFragment) -> Result<(), StoreError>;
    async fn get_fragments(&self, story_id: Uuid) -> Result<Vec<StoryFragment>, StoreError>;

    /// Drop every fragment of a story. Used when a stale outline is healed,
    /// so the dead story leaves nothing behind.
    async fn delete_fragments(&self, story_id: Uuid) -> Result<(), StoreError>;

    async fn mark_keyword_spoken(&self, worm_id: WormId, keyword: &str)
        -> Result<(), StoreError>;
    async fn get_spoken_keywords(&self, worm_id: WormId)
        -> Result<HashSet<String>, StoreError>;

    /// The set of normalized words this worm has consumed.
    async fn get_vocabulary(&self, worm_id: WormId) -> Result<HashSet<String>, StoreError>;
}

/// Everything the store holds, in one serializable value.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StoreState {
    cache: ContentCache,
    templates: HashMap<Uuid, StoryTemplate>,
    /// Keyed by worm: one outline per worm at a time.
    outlines: HashMap<WormId, StoryOutline>,
    /// Keyed by story (outline) id; append-only per story.
    fragments: HashMap<Uuid, Vec<StoryFragment>>,
    spoken: HashMap<WormId, HashSet<String>>,
    vocabulary: HashMap<WormId, HashSet<String>>,
}

impl StoreState {
    fn mark_complete(&mut self, story_id: Uuid) {
        if let Some(outline) = self
            .outlines
            .values_mut()
            .find(|outline| outline.id == story_id)
        {
            if outline.completed_at.is_none() {
                outline.completed_at = Some(unix_millis());
            }
        }
    }

    fn save_fragment(&mut self, fragment: &StoryFragment) {
        let bucket = self.fragments.entry(fragment.story_id).or_default();
        // Reveals are one-way; a second write for the same index is a no-op.
        if !bucket
            .iter()
            .any(|f| f.segment_index == fragment.segment_index)
        {
            bucket.push(fragment.clone());
        }
    }

    fn reset_worm(&mut self, worm_id: WormId) {
        if let Some(outline) = self.outlines.remove(&worm_id) {
            self.fragments.remove(&outline.id);
            self.templates.remove(&outline.template_id);
        }
        self.spoken.remove(&worm_id);
        self.vocabulary.remove(&worm_id);
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-process store. Cheap, complete, and the backbone of the test suite.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a word the worm has consumed (normalized before storage).
    /// Called by the collaborator that owns word intake.
    pub fn add_consumed_word(&self, worm_id: WormId, word: &str) {
        let normalized = normalize_word(word);
        if normalized.is_empty() {
            return;
        }
        self.lock().vocabulary.entry(worm_id).or_default().insert(normalized);
    }

    /// Full per-worm reset: outline, fragments, spoken set, vocabulary.
    pub fn reset_worm(&self, worm_id: WormId) {
        self.lock().reset_worm(worm_id);
    }

    /// Drop every cached generation result.
    pub fn clear_generated_content(&self) {
        self.lock().cache.clear();
    }

    /// Remove a template outright, leaving any outline pointing at it
    /// stale. Exists for tests exercising the stale-outline path.
    pub fn remove_template(&self, id: Uuid) {
        self.lock().templates.remove(&id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().expect("store state lock poisoned")
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn cached_content(&self, context: &str) -> Option<String> {
        self.lock().cache.random(context)
    }

    async fn save_generated_content(&self, context: &str, text: &str) {
        self.lock().cache.insert(context, text);
    }
}

#[async_trait]
impl StoryStore for MemoryStore {
    async fn save_template(&self, template: &StoryTemplate) -> Result<(), StoreError> {
        self.lock().templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<StoryTemplate>, StoreError> {
        Ok(self.lock().templates.get(&id).cloned())
    }

    async fn save_outline(&self, outline: &StoryOutline) -> Result<(), StoreError> {
        self.lock().outlines.insert(outline.worm_id, outline.clone());
        Ok(())
    }

    async fn get_outline(&self, worm_id: WormId) -> Result<Option<StoryOutline>, StoreError> {
        Ok(self.lock().outlines.get(&worm_id).cloned())
    }

    async fn delete_outline(&self, worm_id: WormId) -> Result<(), StoreError> {
        self.lock().outlines.remove(&worm_id);
        Ok(())
    }

    async fn mark_complete(&self, story_id: Uuid) -> Result<(), StoreError> {
        self.lock().mark_complete(story_id);
        Ok(())
    }

    async fn save_fragment(&self, fragment: &StoryFragment) -> Result<(), StoreError> {
        self.lock().save_fragment(fragment);
        Ok(())
    }

    async fn get_fragments(&self, story_id: Uuid) -> Result<Vec<StoryFragment>, StoreError> {
        Ok(self.lock().fragments.get(&story_id).cloned().unwrap_or_default())
    }

    async fn delete_fragments(&self, story_id: Uuid) -> Result<(), StoreError> {
        self.lock().fragments.remove(&story_id);
        Ok(())
    }

    async fn mark_keyword_spoken(
        &self,
        worm_id: WormId,
        keyword: &str,
    ) -> Result<(), StoreError> {
        self.lock()
            .spoken
            .entry(worm_id)
            .or_default()
            .insert(keyword.to_string());
        Ok(())
    }

    async fn get_spoken_keywords(
        &self,
        worm_id: WormId,
    ) -> Result<HashSet<String>, StoreError> {
        Ok(self.lock().spoken.get(&worm_id).cloned().unwrap_or_default())
    }

    async fn get_vocabulary(&self, worm_id: WormId) -> Result<HashSet<String>, StoreError> {
        Ok(self.lock().vocabulary.get(&worm_id).cloned().unwrap_or_default())
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// Current store file version.
const STORE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    state: StoreState,
}

/// JSON-file-backed store. Loads the whole state at open, rewrites the
/// file after every mutation. Fine for a single-process toy backend.
pub struct FileStore {
    path: PathBuf,
    state: tokio::sync::Mutex<StoreState>,
}

impl FileStore {
    /// Open (or create) the store at `path`, checking the file version.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let file: StoreFile = serde_json::from_str(&content)?;
                if file.version != STORE_VERSION {
                    return Err(StoreError::VersionMismatch {
                        expected: STORE_VERSION,
                        found: file.version,
                    });
                }
                file.state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state: tokio::sync::Mutex::new(state),
        })
    }

    /// Record a consumed word (normalized), persisting the change.
    pub async fn add_consumed_word(&self, worm_id: WormId, word: &str) -> Result<(), StoreError> {
        let normalized = normalize_word(word);
        if normalized.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        state.vocabulary.entry(worm_id).or_default().insert(normalized);
        self.persist(&state).await
    }

    /// Full per-worm reset, persisted.
    pub async fn reset_worm(&self, worm_id: WormId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.reset_worm(worm_id);
        self.persist(&state).await
    }

    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let file = StoreFile {
            version: STORE_VERSION,
            state: state.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FileStore {
    async fn cached_content(&self, context: &str) -> Option<String> {
        self.state.lock().await.cache.random(context)
    }

    async fn save_generated_content(&self, context: &str, text: &str) {
        let mut state = self.state.lock().await;
        state.cache.insert(context, text);
        // Cache writes are opportunistic; a failed flush costs one entry.
        let _ = self.persist(&state).await;
    }
}

#[async_trait]
impl StoryStore for FileStore {
    async fn save_template(&self, template: &StoryTemplate) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.templates.insert(template.id, template.clone());
        self.persist(&state).await
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<StoryTemplate>, StoreError> {
        Ok(self.state.lock().await.templates.get(&id).cloned())
    }

    async fn save_outline(&self, outline: &StoryOutline) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.outlines.insert(outline.worm_id, outline.clone());
        self.persist(&state).await
    }

    async fn get_outline(&self, worm_id: WormId) -> Result<Option<StoryOutline>, StoreError> {
        Ok(self.state.lock().await.outlines.get(&worm_id).cloned())
    }

    async fn delete_outline(&self, worm_id: WormId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.outlines.remove(&worm_id);
        self.persist(&state).await
    }

    async fn mark_complete(&self, story_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.mark_complete(story_id);
        self.persist(&state).await
    }

    async fn save_fragment(&self, fragment: &StoryFragment) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.save_fragment(fragment);
        self.persist(&state).await
    }

    async fn get_fragments(&self, story_id: Uuid) -> Result<Vec<StoryFragment>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .fragments
            .get(&story_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_fragments(&self, story_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.fragments.remove(&story_id);
        self.persist(&state).await
    }

    async fn mark_keyword_spoken(
        &self,
        worm_id: WormId,
        keyword: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .spoken
            .entry(worm_id)
            .or_default()
            .insert(keyword.to_string());
        self.persist(&state).await
    }

    async fn get_spoken_keywords(
        &self,
        worm_id: WormId,
    ) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .spoken
            .get(&worm_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_vocabulary(&self, worm_id: WormId) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .vocabulary
            .get(&worm_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::types::TOTAL_SEGMENTS;

    fn sample_template() -> StoryTemplate {
        StoryTemplate {
            id: Uuid::new_v4(),
            title: "The Glasshouse Ledger".to_string(),
            tagline: "Every word waters something".to_string(),
            setting: "an overgrown greenhouse archive".to_string(),
            background_texts: vec!["The mirror fogged over at noon.".to_string()],
            stream_fragments: vec![],
            segments: (0..TOTAL_SEGMENTS)
                .map(|i| crate::story::types::StorySegment {
                    index: i,
                    keywords: vec![format!("word{i}")],
                    hint: format!("hint {i}"),
                    narrative: format!("narrative {i}"),
                })
                .collect(),
        }
    }

    fn sample_outline(worm_id: WormId, template_id: Uuid) -> StoryOutline {
        StoryOutline {
            id: Uuid::new_v4(),
            worm_id,
            template_id,
            total_segments: TOTAL_SEGMENTS,
            created_at: unix_millis(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let worm_id = Uuid::new_v4();
        let template = sample_template();
        let outline = sample_outline(worm_id, template.id);

        store.save_template(&template).await.unwrap();
        store.save_outline(&outline).await.unwrap();

        let loaded = store.get_outline(worm_id).await.unwrap().unwrap();
        assert_eq!(loaded.template_id, template.id);
        assert!(store
            .get_template(loaded.template_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_fragment_writes_are_idempotent_per_index() {
        let store = MemoryStore::new();
        let story_id = Uuid::new_v4();
        let worm_id = Uuid::new_v4();
        let fragment = StoryFragment {
            story_id,
            worm_id,
            segment_index: 3,
            narrative: "the mirror speaks".to_string(),
            created_at: unix_millis(),
        };

        store.save_fragment(&fragment).await.unwrap();
        store.save_fragment(&fragment).await.unwrap();

        assert_eq!(store.get_fragments(story_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_fragments_clears_only_that_story() {
        let store = MemoryStore::new();
        let worm_id = Uuid::new_v4();
        let story_a = Uuid::new_v4();
        let story_b = Uuid::new_v4();
        for (story_id, index) in [(story_a, 0), (story_a, 1), (story_b, 0)] {
            store
                .save_fragment(&StoryFragment {
                    story_id,
                    worm_id,
                    segment_index: index,
                    narrative: format!("narrative {index}"),
                    created_at: unix_millis(),
                })
                .await
                .unwrap();
        }

        store.delete_fragments(story_a).await.unwrap();

        assert!(store.get_fragments(story_a).await.unwrap().is_empty());
        assert_eq!(store.get_fragments(story_b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spoken_keywords_are_a_set() {
        let store = MemoryStore::new();
        let worm_id = Uuid::new_v4();

        store.mark_keyword_spoken(worm_id, "mirror").await.unwrap();
        store.mark_keyword_spoken(worm_id, "mirror").await.unwrap();
        store.mark_keyword_spoken(worm_id, "shadow").await.unwrap();

        let spoken = store.get_spoken_keywords(worm_id).await.unwrap();
        assert_eq!(spoken.len(), 2);
    }

    #[tokio::test]
    async fn test_vocabulary_is_normalized() {
        let store = MemoryStore::new();
        let worm_id = Uuid::new_v4();

        store.add_consumed_word(worm_id, "Mirror!");
        store.add_consumed_word(worm_id, "...");

        let vocabulary = store.get_vocabulary(worm_id).await.unwrap();
        assert!(vocabulary.contains("mirror"));
        assert_eq!(vocabulary.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_worm_clears_everything() {
        let store = MemoryStore::new();
        let worm_id = Uuid::new_v4();
        let template = sample_template();
        let outline = sample_outline(worm_id, template.id);

        store.save_template(&template).await.unwrap();
        store.save_outline(&outline).await.unwrap();
        store.mark_keyword_spoken(worm_id, "mirror").await.unwrap();
        store.add_consumed_word(worm_id, "mirror");

        store.reset_worm(worm_id);

        assert!(store.get_outline(worm_id).await.unwrap().is_none());
        assert!(store.get_spoken_keywords(worm_id).await.unwrap().is_empty());
        assert!(store.get_vocabulary(worm_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_complete_stamps_outline() {
        let store = MemoryStore::new();
        let worm_id = Uuid::new_v4();
        let template = sample_template();
        let outline = sample_outline(worm_id, template.id);
        store.save_template(&template).await.unwrap();
        store.save_outline(&outline).await.unwrap();

        store.mark_complete(outline.id).await.unwrap();

        let loaded = store.get_outline(worm_id).await.unwrap().unwrap();
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("worm_store.json");
        let worm_id = Uuid::new_v4();
        let template = sample_template();

        {
            let store = FileStore::open(&path).await.unwrap();
            store.save_template(&template).await.unwrap();
            store
                .save_outline(&sample_outline(worm_id, template.id))
                .await
                .unwrap();
            store.add_consumed_word(worm_id, "mirror").await.unwrap();
        }

        let reopened = FileStore::open(&path).await.unwrap();
        let outline = reopened.get_outline(worm_id).await.unwrap().unwrap();
        assert_eq!(outline.template_id, template.id);
        assert!(reopened
            .get_vocabulary(worm_id)
            .await
            .unwrap()
            .contains("mirror"));
    }

    #[tokio::test]
    async fn test_file_store_rejects_wrong_version() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("worm_store.json");
        tokio::fs::write(&path, r#"{"version":99,"state":{}}"#)
            .await
            .unwrap();

        let err = match FileStore::open(&path).await {
            Ok(_) => panic!("expected version mismatch"),
            Err(e) => e,
        };
        match err {
            StoreError::VersionMismatch { expected, found } => {
                assert_eq!(expected, STORE_VERSION);
                assert_eq!(found, 99);
            }
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }
}
