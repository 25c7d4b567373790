//! System prompt 组装
//!
//! 分段拼接：角色设定、当前阶段、学习者状态、可用工具（只含当前状态白名单）、回复格式、mindmap 上下文。
//! 对话历史不拼进 prompt，而是作为独立消息交给 LLM。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tools::{tool_call_schema_json, ActionKind, ActionRegistry};

const ROLE_PROMPT: &str = "你是一位陪伴孩子做主题式探究学习的伙伴。学习内容以 mindmap 组织：主题 -> 步骤 -> 任务。\
你用温暖、简短、具体的语言和孩子对话，帮助他们一步步规划与完成自己的探究。";

const TOOL_RULES: &str = "工具使用说明：
1. 你不能直接执行动作，只能「建议应该做什么动作」。
2. 系统会根据你的建议，请使用者确认是否执行，真正的执行由系统完成。
3. 回应中可以加入鼓励与引导，但不能说「我已经为你建立了...」、「我已经完成...」。
4. 只能使用上面列出的工具；不需要动作时使用 chat。";

const REPLY_FORMAT: &str = r#"请只输出一个 JSON 对象，不要加任何其它文字或 Markdown：
{"tool": "action_name", "params": {"param_name": "param_value"}, "message": "给孩子的话"}"#;

/// 学习者参与程度（L0 主动 … L4 完全被动）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LearnerLevel {
    L0,
    L1,
    #[default]
    L2,
    L3,
    L4,
}

impl LearnerLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearnerLevel::L0 => "L0",
            LearnerLevel::L1 => "L1",
            LearnerLevel::L2 => "L2",
            LearnerLevel::L3 => "L3",
            LearnerLevel::L4 => "L4",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            LearnerLevel::L0 => "【主动思考型】孩子有明确的主动想法或问题。以倾听与陪伴为主，用开放式对话帮助厘清思路，不急着导向结论。",
            LearnerLevel::L1 => "【潜在兴趣型】孩子有潜在兴趣但还没有具体方向。用好奇共感的姿态，以情境、问题与观察引发具体的学习动机。",
            LearnerLevel::L2 => "【需要引导型】孩子有些反应但无法自行展开。提供探索模型作为支架，用简单例子说明可能的进行方式。",
            LearnerLevel::L3 => "【缺乏动机型】孩子缺乏启动力。给出具象的建议，让孩子在有指引的情况下找到方向。",
            LearnerLevel::L4 => "【完全被动型】孩子没有主动性也难以自己选择。直接提供具体任务，让孩子在明确的选项中挑一个即可。",
        }
    }
}

impl fmt::Display for LearnerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LearnerLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L0" => Ok(LearnerLevel::L0),
            "L1" => Ok(LearnerLevel::L1),
            "L2" => Ok(LearnerLevel::L2),
            "L3" => Ok(LearnerLevel::L3),
            "L4" => Ok(LearnerLevel::L4),
            other => Err(format!("unknown learner level: {other}")),
        }
    }
}

/// 组装 prompt 所需的当前轮信息
#[derive(Debug, Clone, Default)]
pub struct PromptHints {
    pub level: LearnerLevel,
    pub state: String,
    pub state_description: String,
    pub tools: Vec<ActionKind>,
    /// 已渲染好的 mindmap 上下文
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    actions: Arc<ActionRegistry>,
}

impl PromptBuilder {
    pub fn new(actions: Arc<ActionRegistry>) -> Self {
        Self { actions }
    }

    pub fn build(&self, hints: &PromptHints) -> String {
        let mut sections = vec![
            format!("【角色设定】\n{ROLE_PROMPT}"),
            format!(
                "【当前任务阶段】\n{}：{}",
                hints.state, hints.state_description
            ),
            format!("【使用者学习状态】\n{}", hints.level.prompt()),
        ];

        if !hints.tools.is_empty() {
            sections.push(format!(
                "【可用工具与使用说明】\n{}\n\n{TOOL_RULES}",
                self.actions.describe(&hints.tools)
            ));
        }

        sections.push(format!(
            "【回复格式】\n{REPLY_FORMAT}\n\nJSON Schema:\n{}",
            tool_call_schema_json()
        ));

        if let Some(ctx) = hints.context.as_deref().filter(|c| !c.trim().is_empty()) {
            sections.push(format!("【当前 Mindmap 状态】\n{ctx}"));
        }

        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PromptBuilder {
        PromptBuilder::new(Arc::new(ActionRegistry::builtin().unwrap()))
    }

    #[test]
    fn test_prompt_lists_only_whitelisted_tools() {
        let prompt = builder().build(&PromptHints {
            level: LearnerLevel::L4,
            state: "idle".into(),
            state_description: "等待主题".into(),
            tools: vec![ActionKind::Chat, ActionKind::CreateTopic],
            context: None,
        });
        assert!(prompt.contains("create_topic:"));
        assert!(!prompt.contains("suggest_tasks:"));
        assert!(prompt.contains("完全被动型"));
        assert!(!prompt.contains("【当前 Mindmap 状态】"));
    }

    #[test]
    fn test_prompt_includes_context() {
        let prompt = builder().build(&PromptHints {
            context: Some("主题：蚂蚁".into()),
            ..Default::default()
        });
        assert!(prompt.contains("【当前 Mindmap 状态】\n主题：蚂蚁"));
        assert!(prompt.contains("需要引导型"));
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("l3".parse::<LearnerLevel>().unwrap(), LearnerLevel::L3);
        assert!("L9".parse::<LearnerLevel>().is_err());
        assert_eq!(LearnerLevel::default().to_string(), "L2");
    }
}
