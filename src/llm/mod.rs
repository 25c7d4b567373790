//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）、prompt 组装、对话服务

pub mod chat;
pub mod mock;
pub mod openai;
pub mod prompt;
pub mod traits;

pub use chat::{ChatReply, ChatService};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use prompt::{LearnerLevel, PromptBuilder, PromptHints};
pub use traits::{LlmClient, LlmError};
