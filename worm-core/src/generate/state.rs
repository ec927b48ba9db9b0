//! Rotation and cooldown bookkeeping for the completion providers.
//!
//! All of this state lives inside one [`ProviderStates`] value owned by the
//! orchestrator, so tests can run with isolated state instead of sharing a
//! process-wide singleton.

use std::time::{Duration, Instant};

/// Generation quality/latency class. Each tier carries its own ordered
/// list of candidate models on the primary provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    /// Low-latency, low-stakes text: single-word names, short reactive
    /// thoughts.
    Fast,
    /// Heavier generation: story outlines, long-form paragraphs.
    Advanced,
}

const FAST_MODELS: &[&str] = &[
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
];

const ADVANCED_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.0-flash",
];

/// Model used for every call to the secondary provider.
pub const SECONDARY_MODEL: &str = "mistral-small-latest";

/// Cooldown applied to a primary tier once its whole model list has failed
/// on quota.
pub const TIER_COOLDOWN: Duration = Duration::from_secs(2 * 60);

/// Cooldown applied to the secondary provider on a quota failure.
pub const SECONDARY_COOLDOWN: Duration = Duration::from_secs(5 * 60);

impl ModelTier {
    /// Ordered candidate models for this tier.
    pub fn models(self) -> &'static [&'static str] {
        match self {
            ModelTier::Fast => FAST_MODELS,
            ModelTier::Advanced => ADVANCED_MODELS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Advanced => "advanced",
        }
    }
}

/// Per-tier rotation cursor and failure tracking for the primary provider.
#[derive(Debug, Default, Clone)]
pub struct TierState {
    exhausted_until: Option<Instant>,
    last_model_index: usize,
    failure_count: usize,
}

impl TierState {
    fn is_exhausted(&self, now: Instant) -> bool {
        self.exhausted_until.is_some_and(|until| now < until)
    }
}

/// Mutable provider bookkeeping, mutated only by the orchestrator.
#[derive(Debug, Default, Clone)]
pub struct ProviderStates {
    fast: TierState,
    advanced: TierState,
    secondary_exhausted_until: Option<Instant>,
}

impl ProviderStates {
    pub fn new() -> Self {
        Self::default()
    }

    fn tier(&self, tier: ModelTier) -> &TierState {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Advanced => &self.advanced,
        }
    }

    fn tier_mut(&mut self, tier: ModelTier) -> &mut TierState {
        match tier {
            ModelTier::Fast => &mut self.fast,
            ModelTier::Advanced => &mut self.advanced,
        }
    }

    /// Whether the primary provider may be used for `tier` right now.
    pub fn primary_usable(&self, tier: ModelTier, now: Instant) -> bool {
        !self.tier(tier).is_exhausted(now)
    }

    /// Whether the secondary provider may be used right now.
    pub fn secondary_usable(&self, now: Instant) -> bool {
        !self
            .secondary_exhausted_until
            .is_some_and(|until| now < until)
    }

    /// The model to try next for `tier` on the primary provider.
    pub fn current_model(&self, tier: ModelTier) -> &'static str {
        let models = tier.models();
        models[self.tier(tier).last_model_index % models.len()]
    }

    /// Record a successful primary call: the tier's failure streak ends.
    pub fn record_primary_success(&mut self, tier: ModelTier) {
        self.tier_mut(tier).failure_count = 0;
    }

    /// Record a quota failure on the primary provider: advance the
    /// rotation cursor, and once every candidate model has failed in a
    /// row, put the whole tier on cooldown.
    pub fn record_primary_quota(&mut self, tier: ModelTier, now: Instant) {
        let len = tier.models().len();
        let state = self.tier_mut(tier);
        state.last_model_index = state.last_model_index.wrapping_add(1);
        state.failure_count += 1;
        if state.failure_count >= len {
            state.exhausted_until = Some(now + TIER_COOLDOWN);
            state.failure_count = 0;
        }
    }

    /// Record a quota failure on the secondary provider.
    pub fn record_secondary_quota(&mut self, now: Instant) {
        self.secondary_exhausted_until = Some(now + SECONDARY_COOLDOWN);
    }
}
