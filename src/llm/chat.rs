//! 对话服务
//!
//! 组装 system prompt + 对话记忆 + 本轮输入，调用 LlmClient。
//! 带状态码的失败作为 `ChatReply::Status` 返回，由编排器分类；成功回复写入记忆。

use std::sync::Arc;

use crate::llm::{LlmClient, LlmError, PromptBuilder, PromptHints};
use crate::memory::{ConversationMemory, Message};

/// 一次对话调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    /// LLM 的原始回复文本
    Message(String),
    /// 传输层返回了非成功状态码
    Status { status: u16, body: String },
}

pub struct ChatService {
    llm: Arc<dyn LlmClient>,
    prompt: PromptBuilder,
    memory: ConversationMemory,
}

impl ChatService {
    pub fn new(llm: Arc<dyn LlmClient>, prompt: PromptBuilder, max_turns: usize) -> Self {
        Self {
            llm,
            prompt,
            memory: ConversationMemory::new(max_turns),
        }
    }

    pub async fn send(&mut self, input: &str, hints: &PromptHints) -> Result<ChatReply, LlmError> {
        let mut messages = Vec::with_capacity(self.memory.len() * 2 + 2);
        messages.push(Message::system(self.prompt.build(hints)));
        messages.extend(self.memory.messages());
        messages.push(Message::user(input));

        tracing::debug!(
            state = %hints.state,
            level = %hints.level,
            history_turns = self.memory.len(),
            "sending chat request"
        );

        match self.llm.complete(&messages).await {
            Ok(text) => {
                self.memory.save_context(input, text.clone());
                Ok(ChatReply::Message(text))
            }
            Err(LlmError::Status { status, body }) => Ok(ChatReply::Status { status, body }),
            Err(e) => Err(e),
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn clear_history(&mut self) {
        self.memory.clear();
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::ActionRegistry;

    fn service(mock: Arc<MockLlmClient>) -> ChatService {
        let prompt = PromptBuilder::new(Arc::new(ActionRegistry::builtin().unwrap()));
        ChatService::new(mock, prompt, 10)
    }

    #[tokio::test]
    async fn test_reply_saved_to_memory() {
        let mock = Arc::new(MockLlmClient::scripted([Ok("{\"tool\":\"chat\"}".to_string())]));
        let mut chat = service(mock.clone());
        let reply = chat.send("你好", &PromptHints::default()).await.unwrap();
        assert_eq!(reply, ChatReply::Message("{\"tool\":\"chat\"}".into()));
        assert_eq!(chat.memory().len(), 1);

        chat.send("再来", &PromptHints::default()).await.unwrap();
        // 第二次请求带上第一轮历史
        assert_eq!(mock.call_count(), 2);
        assert_eq!(chat.memory().messages()[0], Message::user("你好"));
    }

    #[tokio::test]
    async fn test_status_is_reported_not_saved() {
        let mock = Arc::new(MockLlmClient::scripted([Err(LlmError::Status {
            status: 502,
            body: "bad gateway".into(),
        })]));
        let mut chat = service(mock);
        let reply = chat.send("你好", &PromptHints::default()).await.unwrap();
        assert!(matches!(reply, ChatReply::Status { status: 502, .. }));
        assert!(chat.memory().is_empty());
    }
}
