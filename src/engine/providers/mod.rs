// Mnemo Engine — Completion Backend Registry
// AnyBackend wraps Box<dyn CompletionBackend> so adding a new backend never
// requires touching call sites — just implement the trait.
//
// The engine only ever needs `complete(system, prompt) -> text` (naming,
// insight phrasing); chat itself belongs to the excluded UI layer.

pub mod openai;

pub use openai::OpenAiCompatibleBackend;

use crate::atoms::error::EngineResult;
use crate::atoms::traits::CompletionBackend;
use crate::atoms::types::CompletionConfig;

/// Type-erased completion backend. Callers hold `AnyBackend` and call
/// `.complete()` without knowing which concrete backend is in use.
pub struct AnyBackend(Box<dyn CompletionBackend>);

impl AnyBackend {
    /// Construct the right concrete backend from a `CompletionConfig`.
    /// Every supported server today speaks the OpenAI chat-completion wire
    /// format (OpenAI, Ollama, OpenRouter, LM Studio…); a backend with a
    /// unique format gets its own module + match arm here.
    pub fn from_config(config: &CompletionConfig) -> Self {
        AnyBackend(Box::new(OpenAiCompatibleBackend::new(config)))
    }

    pub fn from_backend(backend: Box<dyn CompletionBackend>) -> Self {
        AnyBackend(backend)
    }

    pub async fn complete(&self, system_prompt: &str, prompt: &str) -> EngineResult<String> {
        self.0.complete(system_prompt, prompt).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}
