//! 内存版 mindmap 存储
//!
//! 同时实现 ContextProvider（快照 + 订阅）与 MutationApi（执行动作），
//! 供 CLI 与测试使用。每次修改都通过 watch 通道推送新快照。

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::context::{
    ContextProvider, StepSnapshot, TaskSnapshot, TaskStatus, TopicSnapshot, TopicStatus,
};
use crate::tools::{Action, MutationApi, TaskDraft, TEMPLATE_STEPS};

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug)]
pub struct InMemoryPlanner {
    tx: watch::Sender<Option<TopicSnapshot>>,
}

impl Default for InMemoryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlanner {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// 以一个已有主题开始
    pub fn with_topic(topic: TopicSnapshot) -> Self {
        let (tx, _rx) = watch::channel(Some(topic));
        Self { tx }
    }

    pub fn set_task_status(&self, task_id: &str, status: TaskStatus) -> bool {
        let mut found = false;
        self.tx.send_modify(|current| {
            if let Some(task) = current
                .as_mut()
                .into_iter()
                .flat_map(|t| t.steps.iter_mut())
                .flat_map(|s| s.tasks.iter_mut())
                .find(|t| t.id == task_id)
            {
                task.status = status;
                found = true;
            }
        });
        found
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// 在副本上修改，只有成功时才提交并通知订阅者
    fn with_topic_mut<R>(
        &self,
        f: impl FnOnce(&mut TopicSnapshot) -> Result<R, String>,
    ) -> Result<R, String> {
        let mut result = Err("no active topic".to_string());
        self.tx.send_if_modified(|current| {
            let Some(topic) = current.as_mut() else {
                return false;
            };
            let mut draft = topic.clone();
            match f(&mut draft) {
                Ok(value) => {
                    *topic = draft;
                    result = Ok(value);
                    true
                }
                Err(e) => {
                    result = Err(e);
                    false
                }
            }
        });
        result
    }
}

fn push_step(topic: &mut TopicSnapshot, title: &str) -> Value {
    if let Some(existing) = topic.steps.iter().find(|s| s.title == title) {
        return json!({"step_id": existing.id, "created": false});
    }
    let id = new_id();
    topic.steps.push(StepSnapshot {
        id: id.clone(),
        title: title.to_string(),
        tasks: Vec::new(),
    });
    json!({"step_id": id, "created": true})
}

fn push_task(topic: &mut TopicSnapshot, draft: &TaskDraft) -> Result<Value, String> {
    let step_ref = draft.step_tag.trim();
    let step = topic
        .steps
        .iter_mut()
        .find(|s| s.id == step_ref || s.title == step_ref)
        .ok_or_else(|| format!("step not found: {step_ref}"))?;
    let id = new_id();
    step.tasks.push(TaskSnapshot {
        id: id.clone(),
        title: draft.task_name.clone(),
        status: TaskStatus::Todo,
    });
    Ok(json!({"task_id": id, "step_id": step.id}))
}

impl ContextProvider for InMemoryPlanner {
    fn snapshot(&self) -> Option<TopicSnapshot> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<TopicSnapshot>> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl MutationApi for InMemoryPlanner {
    async fn apply(&self, action: &Action) -> Result<Value, String> {
        match action {
            Action::Chat => Ok(Value::Null),
            Action::CreateTopic { topic } => {
                let id = new_id();
                self.tx.send_replace(Some(TopicSnapshot {
                    id: id.clone(),
                    title: topic.clone(),
                    description: String::new(),
                    status: TopicStatus::Active,
                    steps: Vec::new(),
                }));
                Ok(json!({"topic_id": id}))
            }
            Action::CreateStep { step_name } => {
                self.with_topic_mut(|t| Ok(push_step(t, step_name)))
            }
            Action::SuggestSteps { steps } => self.with_topic_mut(|t| {
                Ok(Value::Array(steps.iter().map(|s| push_step(t, s)).collect()))
            }),
            Action::UseTemplateSteps => self.with_topic_mut(|t| {
                Ok(Value::Array(
                    TEMPLATE_STEPS.iter().map(|s| push_step(t, s)).collect(),
                ))
            }),
            Action::CreateTask(draft) => self.with_topic_mut(|t| push_task(t, draft)),
            Action::SuggestTasks { tasks } => self.with_topic_mut(|t| {
                tasks
                    .iter()
                    .map(|d| push_task(t, d))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }),
            Action::CompleteTopic => self.with_topic_mut(|t| {
                t.status = TopicStatus::Completed;
                Ok(json!({"topic_id": t.id, "status": "completed"}))
            }),
            Action::MarkAsBookmark => self.with_topic_mut(|t| {
                t.status = TopicStatus::Bookmarked;
                Ok(json!({"topic_id": t.id, "status": "bookmarked"}))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_topic_steps_tasks() {
        let planner = InMemoryPlanner::new();
        let mut rx = planner.subscribe();

        planner
            .apply(&Action::CreateTopic {
                topic: "蚂蚁".into(),
            })
            .await
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().title, "蚂蚁");

        planner.apply(&Action::UseTemplateSteps).await.unwrap();
        planner
            .apply(&Action::CreateTask(TaskDraft {
                task_name: "画蚂蚁".into(),
                step_tag: "记录".into(),
            }))
            .await
            .unwrap();

        let topic = planner.snapshot().unwrap();
        assert_eq!(topic.steps.len(), 4);
        let step = topic.find_step("记录").unwrap();
        assert_eq!(step.tasks[0].title, "画蚂蚁");
        assert!(planner.set_task_status(&step.tasks[0].id, TaskStatus::Done));
        assert_eq!(planner.snapshot().unwrap().progress(), (1, 1));
    }

    #[tokio::test]
    async fn test_mutation_without_topic_fails() {
        let planner = InMemoryPlanner::new();
        let err = planner
            .apply(&Action::CreateStep {
                step_name: "观察".into(),
            })
            .await
            .unwrap_err();
        assert!(err.contains("no active topic"));
    }

    #[tokio::test]
    async fn test_suggest_tasks_is_all_or_nothing() {
        let planner = InMemoryPlanner::new();
        planner
            .apply(&Action::CreateTopic { topic: "蚂蚁".into() })
            .await
            .unwrap();
        planner
            .apply(&Action::CreateStep {
                step_name: "观察".into(),
            })
            .await
            .unwrap();
        let mut rx = planner.subscribe();
        rx.borrow_and_update();

        let err = planner
            .apply(&Action::SuggestTasks {
                tasks: vec![
                    TaskDraft {
                        task_name: "a".into(),
                        step_tag: "观察".into(),
                    },
                    TaskDraft {
                        task_name: "b".into(),
                        step_tag: "不存在".into(),
                    },
                ],
            })
            .await
            .unwrap_err();

        assert!(err.contains("不存在"));
        let topic = planner.snapshot().unwrap();
        assert!(topic.find_step("观察").unwrap().tasks.is_empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_template_steps_not_duplicated() {
        let planner = InMemoryPlanner::new();
        planner
            .apply(&Action::CreateTopic { topic: "t".into() })
            .await
            .unwrap();
        planner.apply(&Action::UseTemplateSteps).await.unwrap();
        planner.apply(&Action::UseTemplateSteps).await.unwrap();
        assert_eq!(planner.snapshot().unwrap().steps.len(), 4);
    }
}
