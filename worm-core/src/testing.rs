//! Testing utilities.
//!
//! - [`MockProvider`] for deterministic orchestrator behavior without
//!   network calls
//! - canned generation payloads matching the pipeline's schemas
//! - [`TestHarness`] wiring a full in-memory story stack
//! - assertion helpers for unlock-state checks

use crate::generate::Generator;
use crate::store::MemoryStore;
use crate::story::{StoryService, UnlockOutcome, WormId};
use async_trait::async_trait;
use llm::Provider;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A provider that returns scripted results in order.
pub struct MockProvider {
    ready: bool,
    responses: Mutex<VecDeque<Result<String, llm::Error>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockProvider {
    /// Scripted responses, returned front to back.
    pub fn scripted(responses: Vec<Result<String, llm::Error>>) -> Self {
        Self {
            ready: true,
            responses: Mutex::new(responses.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider with no credential; `is_ready` reports false.
    pub fn not_ready() -> Self {
        Self {
            ready: false,
            responses: Mutex::new(VecDeque::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append a response to the script.
    pub fn queue(&self, response: Result<String, llm::Error>) {
        self.responses
            .lock()
            .expect("mock response lock")
            .push_back(response);
    }

    /// Handle onto the (model, prompt) call log, usable after the
    /// provider has been moved into a generator.
    pub fn call_log(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        Arc::clone(&self.calls)
    }

    /// A quota-signature error as the primary vendor emits it.
    pub fn quota_error() -> llm::Error {
        llm::Error::Api {
            status: 429,
            message: "RESOURCE_EXHAUSTED: quota exceeded for model".to_string(),
        }
    }

    /// A non-quota transport error.
    pub fn network_error() -> llm::Error {
        llm::Error::Network("connection refused".to_string())
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String, llm::Error> {
        self.calls
            .lock()
            .expect("mock call lock")
            .push((model.to_string(), prompt.to_string()));
        self.responses
            .lock()
            .expect("mock response lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(llm::Error::Network(
                    "mock provider has no more scripted responses".to_string(),
                ))
            })
    }
}

// ============================================================================
// Canned payloads
// ============================================================================

/// Keywords used by the canned outline, in segment order. Segments 0-6
/// carry one each, 7-9 two each.
pub fn sample_keywords() -> Vec<Vec<&'static str>> {
    vec![
        vec!["mirror"],
        vec!["lantern"],
        vec!["garden"],
        vec!["letter"],
        vec!["clock"],
        vec!["river"],
        vec!["door"],
        vec!["shadow", "frost"],
        vec!["ember", "stone"],
        vec!["voice", "glass"],
    ]
}

/// A valid outline payload matching the phase-1 schema.
pub fn sample_outline_json() -> String {
    let segments: Vec<String> = sample_keywords()
        .iter()
        .enumerate()
        .map(|(i, keywords)| {
            let quoted: Vec<String> = keywords.iter().map(|k| format!("\"{k}\"")).collect();
            format!(
                r#"{{"keywords":[{}],"hint":"hint {i}","narrative":"Segment {i} narrative text."}}"#,
                quoted.join(",")
            )
        })
        .collect();
    format!(
        r#"{{"title":"The Glasshouse Ledger","tagline":"Every word waters something","setting":"an overgrown greenhouse archive","segments":[{}]}}"#,
        segments.join(",")
    )
}

/// A background payload covering every sample keyword twice.
pub fn sample_background_json() -> String {
    let mut passages = Vec::new();
    for keywords in sample_keywords() {
        for keyword in keywords {
            passages.push(format!("\"The journal mentions the {keyword} once.\""));
            passages.push(format!("\"Again the {keyword}, pressed between pages.\""));
        }
    }
    format!("[{}]", passages.join(","))
}

/// A 15-item stream payload.
pub fn sample_stream_json() -> String {
    let items: Vec<String> = (0..15)
        .map(|i| format!("\"Fragment {i} crackles through.\""))
        .collect();
    format!("[{}]", items.join(","))
}

/// Queue the three responses one full story generation consumes, in the
/// order the pipeline issues them: outline, background, stream.
pub fn queue_story_script(provider: &MockProvider) {
    provider.queue(Ok(sample_outline_json()));
    provider.queue(Ok(sample_background_json()));
    provider.queue(Ok(sample_stream_json()));
}

// ============================================================================
// Harness
// ============================================================================

/// A full story stack over an in-memory store and a mock provider.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<MockProvider>,
    pub service: StoryService,
}

impl TestHarness {
    /// Empty script; queue responses through `self.provider`.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(MockProvider::scripted(Vec::new()));
        let generator = Arc::new(
            Generator::new(store.clone())
                .with_primary(provider.clone()),
        );
        let service = StoryService::new(generator, store.clone());
        Self {
            store,
            provider,
            service,
        }
    }

    /// Harness pre-scripted for one full story generation.
    pub fn with_story_script() -> Self {
        let harness = Self::new();
        queue_story_script(&harness.provider);
        harness
    }

    /// Feed consumed words into the worm's vocabulary.
    pub fn feed_words(&self, worm_id: WormId, words: &[&str]) {
        for word in words {
            self.store.add_consumed_word(worm_id, word);
        }
    }

    /// Run one utterance through the unlock engine.
    pub async fn speak(&self, worm_id: WormId, words: &[&str]) -> UnlockOutcome {
        let words: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        self.service
            .check_unlock(worm_id, &words)
            .await
            .expect("check_unlock failed")
    }

    /// Revealed-segment count from persisted state.
    pub async fn revealed_count(&self, worm_id: WormId) -> usize {
        match self
            .service
            .get_story_state(worm_id)
            .await
            .expect("get_story_state failed")
        {
            Some(view) => view.revealed_count,
            None => 0,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion helpers
// ============================================================================

/// Assert the outcome unlocked exactly the given segment index.
#[track_caller]
pub fn assert_unlocked(outcome: &UnlockOutcome, index: usize) {
    assert!(outcome.unlocked, "expected segment {index} to unlock");
    let segment = outcome
        .segment
        .as_ref()
        .unwrap_or_else(|| panic!("unlocked outcome missing segment payload"));
    assert_eq!(segment.index, index, "wrong segment unlocked");
}

/// Assert the outcome unlocked nothing.
#[track_caller]
pub fn assert_locked(outcome: &UnlockOutcome) {
    assert!(
        !outcome.unlocked,
        "expected no unlock, got segment {:?}",
        outcome.segment.as_ref().map(|s| s.index)
    );
}
