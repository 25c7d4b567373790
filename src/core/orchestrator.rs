//! 编排器：一次使用者输入的完整处理流程
//!
//! 记录输入事件 -> 调用对话服务 -> 解析校验 -> 状态门控 -> 引用检查 -> 状态转移 + 选项描述。
//! 失败交给 RecoveryEngine 决定重试预算与回灌上下文，两次尝试之间固定等待。
//! 一个编排器只服务一个会话；`&mut self` 保证同一会话内不会交错执行。

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::watch;

use crate::context::{render_context, ContextProvider, TopicSnapshot};
use crate::core::{AgentError, RecoveryAction, RecoveryEngine, SystemErrorCode};
use crate::fsm::StateController;
use crate::llm::{ChatReply, ChatService, LearnerLevel, PromptHints};
use crate::tools::{
    Action, ActionCall, ActionKind, ActionRegistry, FormRegistry, LlmResponse, MutationExecutor,
    ResponseValidator,
};

/// 使用者输入时记录的事件名
pub const USER_INPUT_EVENT: &str = "input_received";

/// 状态门控结果：拒绝不是错误，而是降级为对话
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Permitted,
    Rejected { tool: ActionKind, state: String },
}

pub struct Orchestrator {
    pub(crate) chat: ChatService,
    pub(crate) controller: StateController,
    pub(crate) validator: ResponseValidator,
    pub(crate) actions: Arc<ActionRegistry>,
    pub(crate) forms: Arc<FormRegistry>,
    pub(crate) executor: Option<MutationExecutor>,
    pub(crate) context: Option<watch::Receiver<Option<TopicSnapshot>>>,
    pub(crate) recovery: RecoveryEngine,
    pub(crate) level: LearnerLevel,
    pub(crate) error_context: Option<String>,
}

impl Orchestrator {
    /// 处理一次使用者输入；成功返回已门控的回复（可能是降级后的 chat）
    pub async fn handle_user_input(&mut self, input: &str) -> Result<LlmResponse, AgentError> {
        let payload = json!({ "input": input });
        self.controller
            .handle_user_event(USER_INPUT_EVENT, Some(&payload));

        let mut max_attempts = self.recovery.policy().max_retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let effective = match self.error_context.take() {
                Some(ctx) => format!("{ctx}\n{input}"),
                None => input.to_string(),
            };

            let err = match self.attempt(&effective).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            if let RecoveryAction::RetryWithContext { budget, context } = self.recovery.handle(&err)
            {
                max_attempts = max_attempts.max(budget);
                self.error_context = Some(context);
            }
            tracing::warn!(attempt, max_attempts, error = %err, "attempt failed");

            if attempt >= max_attempts {
                return Err(AgentError::RetriesExhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            }
            tokio::time::sleep(self.recovery.policy().delay).await;
        }
    }

    async fn attempt(&mut self, input: &str) -> Result<LlmResponse, AgentError> {
        let hints = self.prompt_hints();
        let reply = self
            .chat
            .send(input, &hints)
            .await
            .map_err(|e| AgentError::Transport {
                status: e.status(),
                message: e.to_string(),
            })?;

        let raw = match reply {
            ChatReply::Message(text) => text,
            ChatReply::Status { status, body } => {
                tracing::debug!(status, body = %body, "chat service returned error status");
                return Err(AgentError::from_status(status));
            }
        };
        if raw.trim().is_empty() {
            return Err(AgentError::Parse("empty response".to_string()));
        }

        let mut resp = self.validator.parse(&raw)?;

        if let GateOutcome::Rejected { tool, state } = self.check_gate(resp.tool) {
            tracing::info!(
                tool = %tool,
                state = %state,
                "tool not allowed in current state, falling back to chat"
            );
            return Ok(LlmResponse::chat(resp.message.take().unwrap_or(raw)));
        }

        self.check_references(resp.tool, &resp.params)?;

        if let Some(event) = self.actions.get(resp.tool).and_then(|d| d.event.as_deref()) {
            if self.controller.can_trigger(event) {
                self.controller.transition(event);
            } else {
                tracing::debug!(
                    event,
                    state = %self.controller.current_state(),
                    "accepted action has no transition here"
                );
            }
        }

        resp.form = self.forms.build(resp.tool, &resp.params);
        Ok(resp)
    }

    /// 当前状态是否允许该工具
    pub fn check_gate(&self, tool: ActionKind) -> GateOutcome {
        if self.controller.is_tool_allowed(tool) {
            GateOutcome::Permitted
        } else {
            GateOutcome::Rejected {
                tool,
                state: self.controller.current_state().to_string(),
            }
        }
    }

    /// 检查任务类动作引用的步骤是否存在；未接入上下文时跳过
    pub fn check_references(
        &self,
        kind: ActionKind,
        params: &Map<String, Value>,
    ) -> Result<(), AgentError> {
        if !matches!(kind, ActionKind::CreateTask | ActionKind::SuggestTasks) {
            return Ok(());
        }
        let Some(rx) = &self.context else {
            return Ok(());
        };
        let action = Action::from_call(&ActionCall::new(kind, params.clone()))?;
        let refs = action.step_refs();

        if refs.iter().any(|r| r.trim().is_empty()) {
            return Err(AgentError::system(
                SystemErrorCode::StepIdRequired,
                "哎呀！我需要知道要把任务加到哪个步骤。让我想想看...",
            ));
        }

        let snapshot = rx.borrow().clone();
        let Some(topic) = snapshot else {
            return Err(AgentError::system(
                SystemErrorCode::TopicNotFound,
                "找不到目前的主题，让我检查一下...",
            ));
        };
        if topic.steps.is_empty() {
            return Err(AgentError::system(
                SystemErrorCode::NoSteps,
                "需要先建立步骤。建议使用 use_template_steps 建立预设步骤结构。",
            ));
        }
        if let Some(missing) = refs.iter().find(|r| topic.find_step(r).is_none()) {
            let known = topic
                .steps
                .iter()
                .map(|s| s.title.as_str())
                .collect::<Vec<_>>()
                .join("、");
            return Err(AgentError::system(
                SystemErrorCode::StepNotFound,
                format!("咦？步骤「{missing}」好像不见了。现有的步骤有：{known}"),
            ));
        }
        Ok(())
    }

    /// 执行使用者选定的动作；不重试，也不再检查状态白名单（选项被接受时已经检查过）
    pub async fn execute_action(&self, call: &ActionCall) -> Result<Value, AgentError> {
        self.validator.validate_params(call.kind, &call.params)?;
        self.check_references(call.kind, &call.params)?;
        let action = Action::from_call(call)?;
        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| AgentError::Config("no mutation api attached".to_string()))?;
        executor.execute(&action).await
    }

    fn prompt_hints(&self) -> PromptHints {
        PromptHints {
            level: self.level,
            state: self.controller.current_state().to_string(),
            state_description: self
                .controller
                .current_state_info()
                .map(|s| s.description.clone())
                .unwrap_or_default(),
            tools: self.controller.available_tools(),
            context: self
                .context
                .as_ref()
                .map(|rx| render_context(rx.borrow().as_ref())),
        }
    }

    pub fn level(&self) -> LearnerLevel {
        self.level
    }

    pub fn set_level(&mut self, level: LearnerLevel) {
        tracing::info!(from = %self.level, to = %level, "learner level changed");
        self.level = level;
    }

    pub fn controller(&self) -> &StateController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut StateController {
        &mut self.controller
    }

    /// 清空对话记忆与待回灌的错误上下文
    pub fn clear_history(&mut self) {
        self.chat.clear_history();
        self.error_context = None;
    }

    pub fn set_context_source(&mut self, provider: &dyn ContextProvider) {
        self.context = Some(provider.subscribe());
    }

    /// 下一次输入前会附加的错误上下文
    pub fn pending_error_context(&self) -> Option<&str> {
        self.error_context.as_deref()
    }

    pub fn chat(&self) -> &ChatService {
        &self.chat
    }
}
