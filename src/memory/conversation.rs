//! 对话记忆
//!
//! 保留最近 N 轮（user + assistant 为一轮），超出时丢弃最旧的一轮。
//! 每轮记录时间戳，供 UI 渲染与调试。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 一轮对话
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub input: String,
    pub output: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ConversationMemory {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns: max_turns.max(1),
        }
    }

    /// 记录一轮对话；output 为 LLM 原始回复
    pub fn save_context(&mut self, input: impl Into<String>, output: impl Into<String>) {
        self.turns.push_back(Turn {
            input: input.into(),
            output: output.into(),
            at: Utc::now(),
        });
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// 按时间顺序展开为 user / assistant 消息
    pub fn messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .flat_map(|t| [Message::user(&t.input), Message::assistant(&t.output)])
            .collect()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_last_n_turns() {
        let mut memory = ConversationMemory::new(10);
        for i in 0..12 {
            memory.save_context(format!("q{i}"), format!("a{i}"));
        }
        assert_eq!(memory.len(), 10);
        let messages = memory.messages();
        assert_eq!(messages.len(), 20);
        assert_eq!(messages[0], Message::user("q2"));
        assert_eq!(messages[19], Message::assistant("a11"));

        let first = memory.turns().next().unwrap();
        assert_eq!(first.input, "q2");
        assert_eq!(first.output, "a2");
        assert!(memory.turns().all(|t| t.at <= Utc::now()));
    }

    #[test]
    fn test_clear() {
        let mut memory = ConversationMemory::new(2);
        memory.save_context("hi", "hello");
        assert!(!memory.is_empty());
        memory.clear();
        assert!(memory.is_empty());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::system("x")).unwrap();
        assert!(json.contains("\"system\""));
    }
}
