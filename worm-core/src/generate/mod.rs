//! Text generation orchestrator.
//!
//! [`Generator::generate`] is the one entry point every feature uses to
//! get text out of a model. It never fails: it rotates models on quota
//! errors, swaps vendors, backs off between attempts, and when everything
//! is down it serves cached output or a hardcoded default. Every success
//! is written back to the cache for offline reuse.

mod fallback;
mod state;

pub use fallback::{fallback_names, fallback_text};
pub use state::{
    ModelTier, ProviderStates, SECONDARY_COOLDOWN, SECONDARY_MODEL, TIER_COOLDOWN,
};

use crate::store::ContentStore;
use llm::Provider;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Total call attempts before giving up on live generation.
pub const MAX_ATTEMPTS: usize = 5;

/// Backoff step between attempts; attempt `n` waits `n * 500ms`.
pub const BACKOFF_STEP: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderKind {
    Primary,
    Secondary,
}

/// The orchestrator. Owns all provider bookkeeping; no global state.
pub struct Generator {
    primary: Option<Arc<dyn Provider>>,
    secondary: Option<Arc<dyn Provider>>,
    states: Mutex<ProviderStates>,
    content: Arc<dyn ContentStore>,
}

impl Generator {
    /// Create a generator with no providers configured. Useful as a base
    /// for the builder methods; without providers every call resolves
    /// through the cache and fallback tables.
    pub fn new(content: Arc<dyn ContentStore>) -> Self {
        Self {
            primary: None,
            secondary: None,
            states: Mutex::new(ProviderStates::new()),
            content,
        }
    }

    /// Set the primary (tiered, model-rotating) provider.
    pub fn with_primary(mut self, provider: Arc<dyn Provider>) -> Self {
        self.primary = Some(provider);
        self
    }

    /// Set the secondary provider used when the primary is unavailable.
    pub fn with_secondary(mut self, provider: Arc<dyn Provider>) -> Self {
        self.secondary = Some(provider);
        self
    }

    /// Wire up whatever vendors have credentials in the environment.
    pub fn from_env(content: Arc<dyn ContentStore>) -> Self {
        let mut generator = Self::new(content);
        if let Ok(gemini) = llm::Gemini::from_env() {
            generator = generator.with_primary(Arc::new(gemini));
        }
        if let Ok(mistral) = llm::Mistral::from_env() {
            generator = generator.with_secondary(Arc::new(mistral));
        }
        generator
    }

    /// Generate text for `prompt`, classified under `context`.
    ///
    /// Always returns some string; degraded paths go cache first, then
    /// the hardcoded per-context defaults.
    pub async fn generate(&self, prompt: &str, context: &str, tier: ModelTier) -> String {
        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(BACKOFF_STEP * (attempt as u32 - 1)).await;
            }

            let Some((kind, provider, model)) = self.pick_provider(tier) else {
                // Nothing callable right now; a cache hit ends the call.
                if let Some(hit) = self.content.cached_content(context).await {
                    debug!(context, "no provider available, served from cache");
                    return hit;
                }
                break;
            };

            match provider.complete(model, prompt).await {
                Ok(text) => {
                    if kind == ProviderKind::Primary {
                        self.states
                            .lock()
                            .expect("provider state lock poisoned")
                            .record_primary_success(tier);
                    }
                    self.content.save_generated_content(context, &text).await;
                    return text;
                }
                Err(err) if is_quota_error(&err) => {
                    warn!(
                        provider = provider.name(),
                        model,
                        attempt,
                        "quota failure, rotating"
                    );
                    let now = Instant::now();
                    let mut states =
                        self.states.lock().expect("provider state lock poisoned");
                    match kind {
                        ProviderKind::Primary => states.record_primary_quota(tier, now),
                        ProviderKind::Secondary => states.record_secondary_quota(now),
                    }
                }
                Err(err) => {
                    warn!(
                        provider = provider.name(),
                        model,
                        error = %err,
                        "provider call failed"
                    );
                    break;
                }
            }
        }

        if let Some(hit) = self.content.cached_content(context).await {
            debug!(context, "generation failed, served from cache");
            return hit;
        }
        debug!(context, "generation failed, serving hardcoded fallback");
        fallback_text(context)
    }

    /// Choose the provider and model for the next attempt. Primary wins
    /// when it has a credential and the tier is not cooling down.
    fn pick_provider(
        &self,
        tier: ModelTier,
    ) -> Option<(ProviderKind, Arc<dyn Provider>, &'static str)> {
        let now = Instant::now();
        let states = self.states.lock().expect("provider state lock poisoned");

        if let Some(primary) = &self.primary {
            if primary.is_ready() && states.primary_usable(tier, now) {
                let model = states.current_model(tier);
                return Some((ProviderKind::Primary, Arc::clone(primary), model));
            }
        }
        if let Some(secondary) = &self.secondary {
            if secondary.is_ready() && states.secondary_usable(now) {
                return Some((ProviderKind::Secondary, Arc::clone(secondary), SECONDARY_MODEL));
            }
        }
        None
    }
}

/// Quota/rate-limit signature: HTTP 429, a resource-exhaustion marker, or
/// the word "quota" anywhere in the error text.
fn is_quota_error(err: &llm::Error) -> bool {
    if let llm::Error::Api { status: 429, .. } = err {
        return true;
    }
    let text = err.to_string().to_ascii_lowercase();
    text.contains("resource_exhausted") || text.contains("quota")
}
