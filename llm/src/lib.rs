//! Minimal text-completion clients.
//!
//! This crate provides focused clients for the two completion vendors the
//! story backend can talk to, behind a single `Provider` trait:
//! - `Gemini` for Google's generateContent endpoint (primary)
//! - `Mistral` for the chat-completions endpoint (secondary)
//!
//! The clients deliberately expose only plain prompt-in, text-out
//! completion. Error bodies are passed through verbatim so callers can
//! pattern-match vendor quota signatures.

use async_trait::async_trait;
use thiserror::Error;

mod gemini;
mod mistral;

pub use gemini::Gemini;
pub use mistral::Mistral;

/// Errors that can occur when calling a completion vendor.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// A text-completion vendor.
///
/// Implementations are cheap to clone behind an `Arc` and safe to share
/// across tasks.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short vendor name, used in logs.
    fn name(&self) -> &'static str;

    /// Whether the provider has a credential and can be called at all.
    fn is_ready(&self) -> bool;

    /// Send a prompt to the given model and return the completion text.
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, Error>;
}

pub(crate) fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .connect_timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client")
}
