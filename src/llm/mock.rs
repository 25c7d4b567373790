//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按顺序返回预置回复；用完后回显最后一条 User 消息为 chat 回复。
//! 记录每次收到的消息，测试可以据此检查 prompt 与回灌的错误上下文。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以一组预置结果创建
    pub fn scripted<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(reply.into()));
        }
    }

    pub fn push_error(&self, err: LlmError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(err));
        }
    }

    /// 已收到的请求数
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// 每次请求中最后一条 User 消息
    pub fn user_inputs(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|reqs| {
                reqs.iter()
                    .filter_map(|msgs| last_user(msgs).map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 每次请求的 system prompt
    pub fn system_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|reqs| {
                reqs.iter()
                    .filter_map(|msgs| {
                        msgs.iter()
                            .find(|m| m.role == Role::System)
                            .map(|m| m.content.clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn last_user(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut reqs) = self.requests.lock() {
            reqs.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(reply) => reply,
            None => {
                let echo = last_user(messages).unwrap_or("(no input)");
                Ok(serde_json::json!({
                    "tool": "chat",
                    "params": {},
                    "message": format!("Echo from Mock: {echo}"),
                })
                .to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_echo() {
        let mock = MockLlmClient::scripted([
            Ok("first".to_string()),
            Err(LlmError::Status {
                status: 503,
                body: String::new(),
            }),
        ]);
        let msgs = [Message::user("你好")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(mock.complete(&msgs).await.unwrap_err().status(), Some(503));
        let echo = mock.complete(&msgs).await.unwrap();
        assert!(echo.contains("Echo from Mock: 你好"));
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.user_inputs(), vec!["你好"; 3]);
    }

    #[tokio::test]
    async fn test_push_after_construction() {
        let mock = MockLlmClient::new();
        mock.push_error(LlmError::Timeout);
        mock.push_reply("second");
        let msgs = [Message::user("hi")];
        assert!(matches!(mock.complete(&msgs).await, Err(LlmError::Timeout)));
        assert_eq!(mock.complete(&msgs).await.unwrap(), "second");
    }
}
