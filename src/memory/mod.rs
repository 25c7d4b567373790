//! 记忆层：与 LLM 的短期对话历史

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role, Turn};
