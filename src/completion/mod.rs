//! Completion endpoint integration
//!
//! One call to [`CompletionClient::complete`] is exactly one HTTP request. Retries,
//! if wanted, are the caller's decision.

mod openai_compat;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use thiserror::Error;

use crate::conversation::ConversationMessage;

pub use openai_compat::{OpenAICompatClient, OpenAICompatConfig};

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Completion request failed: HTTP {status}")]
    RequestFailed { status: u16 },

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Text deltas of a streamed completion, in arrival order.
pub type DeltaStream = BoxStream<'static, Result<String, CompletionError>>;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send `system_prompt`, then `history` in order, then `new_turn` as the last
    /// user message, and return the text of the first completion.
    async fn complete(
        &self,
        credential: &str,
        history: &[ConversationMessage],
        new_turn: &str,
        system_prompt: &str,
    ) -> Result<String, CompletionError>;

    /// Streaming variant. Backends without streaming yield the whole reply once.
    async fn complete_stream(
        &self,
        credential: &str,
        history: &[ConversationMessage],
        new_turn: &str,
        system_prompt: &str,
    ) -> Result<DeltaStream, CompletionError> {
        let text = self
            .complete(credential, history, new_turn, system_prompt)
            .await?;
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }
}
