//! Language Model traits

use async_trait::async_trait;

use crate::{Result, Turn};

/// Language Model interface
///
/// Implementations:
/// - `ConversationalModel` - wraps an OpenAI-compatible chat backend
///
/// # Example
///
/// ```ignore
/// let llm: Arc<dyn LanguageModel> = Arc::new(ConversationalModel::new(backend));
/// let reply = llm.respond(context.turns()).await?;
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Produce the assistant's next reply
    ///
    /// # Arguments
    /// * `turns` - Conversation so far, system prompt first, ending with the user turn
    ///
    /// # Returns
    /// Reply text to be spoken back to the caller
    async fn respond(&self, turns: &[Turn]) -> Result<String>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
