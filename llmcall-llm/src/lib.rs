//! Provider adapters for hosted LLM vendors.
//!
//! Each adapter resolves credentials, lists models and builds a model handle; the
//! registry holds one adapter per vendor and `generate_text` runs a single call.

mod anthropic;
mod error;
mod generate;
mod openai;
mod provider;
mod registry;
mod types;

pub use anthropic::{ANTHROPIC_PROVIDER_NAME, AnthropicChatModel, AnthropicProvider};
pub use error::{LlmError, Result};
pub use generate::{GenerateTextOptions, GenerateTextResult, MAX_TOKENS, generate_text};
pub use openai::{OPENAI_PROVIDER_NAME, OpenAiChatModel, OpenAiModelSettings, OpenAiProvider};
pub use provider::{LanguageModel, ProviderAdapter, ProviderEndpoint};
pub use registry::ProviderRegistry;
pub use types::{
    CallOptions, ChatMessage, Credentials, FinishReason, GenerateOutput, ModelInfo,
    ProviderSetting, ResponseMetadata, Role, ServerEnv, ToolChoice, Usage,
};
