//! 类型化动作
//!
//! `ActionCall` 是「工具名 + JSON 参数」的松散形式（来自选项点选或 LLM 回复），
//! `Action` 是交给 mutation API 的封闭和类型，穷尽匹配由编译器保证。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::tools::ActionKind;

/// 使用模板时建立的四个步骤
pub const TEMPLATE_STEPS: [&str; 4] = ["观察", "行动", "记录", "分享"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub task_name: String,
    /// 所属步骤的标题或 id
    pub step_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Chat,
    CreateTopic { topic: String },
    CreateStep { step_name: String },
    CreateTask(TaskDraft),
    SuggestSteps { steps: Vec<String> },
    SuggestTasks { tasks: Vec<TaskDraft> },
    UseTemplateSteps,
    CompleteTopic,
    MarkAsBookmark,
}

/// 待执行的动作调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ActionCall {
    pub fn new(kind: ActionKind, params: Map<String, Value>) -> Self {
        Self { kind, params }
    }
}

fn field<T: serde::de::DeserializeOwned>(
    params: &Map<String, Value>,
    name: &str,
) -> Result<T, AgentError> {
    let value = params.get(name).cloned().ok_or_else(|| {
        AgentError::SchemaValidation(format!("missing required parameter: {name}"))
    })?;
    serde_json::from_value(value)
        .map_err(|e| AgentError::SchemaValidation(format!("parameter {name}: {e}")))
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Chat => ActionKind::Chat,
            Action::CreateTopic { .. } => ActionKind::CreateTopic,
            Action::CreateStep { .. } => ActionKind::CreateStep,
            Action::CreateTask(_) => ActionKind::CreateTask,
            Action::SuggestSteps { .. } => ActionKind::SuggestSteps,
            Action::SuggestTasks { .. } => ActionKind::SuggestTasks,
            Action::UseTemplateSteps => ActionKind::UseTemplateSteps,
            Action::CompleteTopic => ActionKind::CompleteTopic,
            Action::MarkAsBookmark => ActionKind::MarkAsBookmark,
        }
    }

    /// 从松散调用构造；参数应已通过 ResponseValidator 校验，这里只做类型提取
    pub fn from_call(call: &ActionCall) -> Result<Self, AgentError> {
        let p = &call.params;
        Ok(match call.kind {
            ActionKind::Chat => Action::Chat,
            ActionKind::CreateTopic => Action::CreateTopic {
                topic: field(p, "topic")?,
            },
            ActionKind::CreateStep => Action::CreateStep {
                step_name: field(p, "step_name")?,
            },
            ActionKind::CreateTask => Action::CreateTask(TaskDraft {
                task_name: field(p, "task_name")?,
                step_tag: field(p, "step_tag")?,
            }),
            ActionKind::SuggestSteps => Action::SuggestSteps {
                steps: field(p, "steps")?,
            },
            ActionKind::SuggestTasks => Action::SuggestTasks {
                tasks: field(p, "tasks")?,
            },
            ActionKind::UseTemplateSteps => Action::UseTemplateSteps,
            ActionKind::CompleteTopic => Action::CompleteTopic,
            ActionKind::MarkAsBookmark => Action::MarkAsBookmark,
        })
    }

    /// 该动作引用的步骤（用于执行前的引用检查）
    pub fn step_refs(&self) -> Vec<&str> {
        match self {
            Action::CreateTask(t) => vec![t.step_tag.as_str()],
            Action::SuggestTasks { tasks } => tasks.iter().map(|t| t.step_tag.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(kind: ActionKind, params: Value) -> ActionCall {
        ActionCall::new(kind, params.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_from_call_every_kind() {
        for kind in ActionKind::ALL {
            let params = match kind {
                ActionKind::CreateTopic => json!({"topic": "蚂蚁"}),
                ActionKind::CreateStep => json!({"step_name": "观察"}),
                ActionKind::CreateTask => json!({"task_name": "画蚂蚁", "step_tag": "记录"}),
                ActionKind::SuggestSteps => json!({"steps": ["观察"]}),
                ActionKind::SuggestTasks => {
                    json!({"tasks": [{"task_name": "a", "step_tag": "观察"}]})
                }
                _ => json!({}),
            };
            let action = Action::from_call(&call(kind, params)).unwrap();
            assert_eq!(action.kind(), kind);
        }
    }

    #[test]
    fn test_from_call_missing_param() {
        let err = Action::from_call(&call(ActionKind::CreateTask, json!({"task_name": "x"})))
            .unwrap_err();
        assert!(err.to_string().contains("step_tag"));
    }

    #[test]
    fn test_step_refs() {
        let action = Action::from_call(&call(
            ActionKind::SuggestTasks,
            json!({"tasks": [
                {"task_name": "a", "step_tag": "观察"},
                {"task_name": "b", "step_tag": "分享"}
            ]}),
        ))
        .unwrap();
        assert_eq!(action.step_refs(), vec!["观察", "分享"]);
        assert!(Action::Chat.step_refs().is_empty());
    }
}
