//! Story generation engine for the word-eating worm toy.
//!
//! This crate provides:
//! - A text generation orchestrator that survives quota exhaustion,
//!   rotates models and vendors, and degrades through cache and
//!   hardcoded fallbacks without ever failing its caller
//! - A multi-phase story pipeline (outline, background material, keyword
//!   coverage patching) driven by a single free-text identity prompt
//! - A keyword-gated unlock engine that reveals story segments one at a
//!   time as the worm consumes and speaks keywords
//! - Pluggable persistence (in-memory and versioned-JSON file stores)
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use worm_core::{Generator, MemoryStore, StoryService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let generator = Arc::new(Generator::from_env(store.clone()));
//!     let stories = StoryService::new(generator, store);
//!
//!     let worm_id = uuid::Uuid::new_v4();
//!     let view = stories.generate_story(worm_id, "a worm that hoards mirrors").await?;
//!     println!("{} ({} segments)", view.title, view.total_segments);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod extract;
pub mod generate;
pub mod store;
pub mod story;
pub mod testing;

// Primary public API
pub use generate::{Generator, ModelTier};
pub use store::{ContentStore, FileStore, MemoryStore, StoreError, StoryStore};
pub use story::{
    SegmentView, StoryError, StoryService, StoryView, UnlockOutcome, WormId, TOTAL_SEGMENTS,
};
pub use testing::{MockProvider, TestHarness};
