//! Mindmap 上下文
//!
//! 当前主题的只读快照（主题 / 步骤 / 任务的 id、标题、状态），
//! 由 ContextProvider 通过 tokio watch 通道推送，编排器随时读取最新值。

pub mod in_memory;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use in_memory::InMemoryPlanner;

/// 没有主题时交给 LLM 的上下文
pub const NO_ACTIVE_TOPIC: &str = "No active topic";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    #[default]
    Active,
    Completed,
    Bookmarked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tasks: Vec<TaskSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSnapshot {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TopicStatus,
    #[serde(default)]
    pub steps: Vec<StepSnapshot>,
}

impl TopicSnapshot {
    /// 按 id 或标题查找步骤（LLM 通常给标题）
    pub fn find_step(&self, reference: &str) -> Option<&StepSnapshot> {
        let reference = reference.trim();
        self.steps
            .iter()
            .find(|s| s.id == reference)
            .or_else(|| self.steps.iter().find(|s| s.title == reference))
    }

    /// (已完成任务数, 任务总数)
    pub fn progress(&self) -> (usize, usize) {
        self.steps
            .iter()
            .flat_map(|s| &s.tasks)
            .fold((0, 0), |(done, total), t| {
                (done + usize::from(t.status == TaskStatus::Done), total + 1)
            })
    }
}

/// 渲染给 LLM 的上下文文本
pub fn render_context(snapshot: Option<&TopicSnapshot>) -> String {
    match snapshot {
        Some(topic) => {
            serde_json::to_string_pretty(topic).unwrap_or_else(|_| topic.title.clone())
        }
        None => NO_ACTIVE_TOPIC.to_string(),
    }
}

/// 上下文提供方：外部 mindmap 存储
pub trait ContextProvider: Send + Sync {
    fn snapshot(&self) -> Option<TopicSnapshot>;

    /// 订阅快照变化；接收端总能读到最新值
    fn subscribe(&self) -> watch::Receiver<Option<TopicSnapshot>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> TopicSnapshot {
        TopicSnapshot {
            id: "t1".into(),
            title: "蚂蚁".into(),
            description: String::new(),
            status: TopicStatus::Active,
            steps: vec![StepSnapshot {
                id: "s1".into(),
                title: "观察".into(),
                tasks: vec![
                    TaskSnapshot {
                        id: "k1".into(),
                        title: "找蚁窝".into(),
                        status: TaskStatus::Done,
                    },
                    TaskSnapshot {
                        id: "k2".into(),
                        title: "画蚂蚁".into(),
                        status: TaskStatus::Todo,
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_find_step_by_id_or_title() {
        let t = topic();
        assert_eq!(t.find_step("s1").map(|s| s.title.as_str()), Some("观察"));
        assert_eq!(t.find_step(" 观察 ").map(|s| s.id.as_str()), Some("s1"));
        assert!(t.find_step("分享").is_none());
    }

    #[test]
    fn test_progress_and_render() {
        let t = topic();
        assert_eq!(t.progress(), (1, 2));
        let text = render_context(Some(&t));
        assert!(text.contains("\"title\": \"蚂蚁\""));
        assert!(text.contains("\"status\": \"done\""));
        assert_eq!(render_context(None), NO_ACTIVE_TOPIC);
    }
}
