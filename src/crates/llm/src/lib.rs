//! LLM provider clients for maestro.
//!
//! Two remote providers are wired in: OpenAI chat completions (the supervisor
//! and every agent prompt) and Perplexity web search (the research agent's
//! online lookups, optional at runtime). Both sit behind small traits so the
//! rest of the workspace can substitute scripted models in tests.
//!
//! Provider calls go through a per-provider [`RateLimiter`] gate and the
//! [`with_backoff`] retry helper, which honors server-reported retry delays
//! on 429 responses.

mod chat;
mod config;
mod error;
mod openai;
mod perplexity;
mod rate_limit;

pub use chat::{ChatMessage, ChatModel, ChatRequest, ChatResponse, ChatRole, Usage};
pub use config::RemoteLlmConfig;
pub use error::{LlmError, Result};
pub use openai::OpenAiClient;
pub use perplexity::{PerplexityClient, WebSearch, WebSearchResult};
pub use rate_limit::{with_backoff, GatedChatModel, RateLimiter};
