//! 状态控制器：持有当前状态与有界历史栈
//!
//! 两个入口刻意不对称：
//! - `handle_user_event`：只记录使用者输入，永远不触发状态转移；
//! - `handle_ai_action`：必须能在当前状态的转移表中找到事件才放行。
//!
//! `transition` 是唯一会修改状态的方法（`rollback` / `reset` 只在历史内移动或重置）。
//! 一个控制器只属于一个会话，不做内部加锁。

use std::collections::VecDeque;

use serde::Serialize;
use serde_json::Value;

use crate::fsm::{StateConfig, StateMachine};
use crate::tools::ActionKind;

/// 历史栈默认上限
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// 门控拒绝原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    InvalidState,
    InvalidTransition,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::InvalidState => "invalid_state",
            GateReason::InvalidTransition => "invalid_transition",
        }
    }
}

/// 事件门控结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<GateReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_state: Option<String>,
}

/// 可触发事件建议
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionSuggestion {
    pub event: String,
    pub target: String,
}

/// 控制器状态快照（可序列化，供 UI / 日志使用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSnapshot {
    pub current: String,
    pub history: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StateController {
    machine: StateMachine,
    current: String,
    history: VecDeque<String>,
    history_limit: usize,
}

impl StateController {
    /// 以指定初始状态创建；初始状态未注册时也允许创建，但所有门控检查都会失败，直到 reset
    pub fn new(machine: StateMachine, initial: impl Into<String>) -> Self {
        let initial = initial.into();
        if !machine.is_valid_state(&initial) {
            tracing::warn!(
                state = %initial,
                "controller created with an unregistered initial state"
            );
        }
        Self {
            machine,
            history: VecDeque::from([initial.clone()]),
            current: initial,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self.trim_history();
        self
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn current_state(&self) -> &str {
        &self.current
    }

    pub fn state_history(&self) -> Vec<String> {
        self.history.iter().cloned().collect()
    }

    pub fn current_state_info(&self) -> Option<&StateConfig> {
        self.machine.state(&self.current)
    }

    pub fn can_trigger(&self, event: &str) -> bool {
        self.machine.next_state(&self.current, event).is_some()
    }

    /// 使用者事件：只记录，永远放行且不转移
    pub fn handle_user_event(&self, event: &str, payload: Option<&Value>) -> GateResult {
        tracing::debug!(
            state = %self.current,
            event,
            has_payload = payload.is_some(),
            "user event"
        );
        GateResult {
            allowed: true,
            reason: None,
            next_state: Some(self.current.clone()),
        }
    }

    /// AI 动作：查当前状态的转移表
    pub fn handle_ai_action(&self, event: &str, payload: Option<&Value>) -> GateResult {
        tracing::debug!(
            state = %self.current,
            event,
            has_payload = payload.is_some(),
            "ai action"
        );
        let Some(state) = self.current_state_info() else {
            return GateResult {
                allowed: false,
                reason: Some(GateReason::InvalidState),
                next_state: Some(self.current.clone()),
            };
        };
        match state.transitions.get(event) {
            Some(next) => GateResult {
                allowed: true,
                reason: None,
                next_state: Some(next.clone()),
            },
            None => GateResult {
                allowed: false,
                reason: Some(GateReason::InvalidTransition),
                next_state: Some(self.current.clone()),
            },
        }
    }

    /// 执行状态转移；失败时不改变任何状态
    pub fn transition(&mut self, event: &str) -> bool {
        let result = self.handle_ai_action(event, None);
        if !result.allowed {
            tracing::warn!(
                state = %self.current,
                event,
                reason = result.reason.map(|r| r.as_str()).unwrap_or("unknown"),
                "transition rejected"
            );
            return false;
        }
        let Some(next) = result.next_state else {
            tracing::warn!(state = %self.current, event, "transition has no target state");
            return false;
        };
        tracing::info!(from = %self.current, to = %next, event, "state transition");
        self.current = next.clone();
        self.history.push_back(next);
        self.trim_history();
        true
    }

    pub fn available_tools(&self) -> Vec<ActionKind> {
        self.machine.available_tools(&self.current)
    }

    pub fn is_tool_allowed(&self, tool: ActionKind) -> bool {
        self.available_tools().contains(&tool)
    }

    pub fn available_events(&self) -> Vec<String> {
        self.machine.available_events(&self.current)
    }

    pub fn transition_suggestions(&self) -> Vec<TransitionSuggestion> {
        self.current_state_info()
            .map(|s| {
                s.transitions
                    .iter()
                    .map(|(event, target)| TransitionSuggestion {
                        event: event.clone(),
                        target: target.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn reset(&mut self, initial: impl Into<String>) {
        let initial = initial.into();
        tracing::info!(state = %initial, "controller reset");
        self.current = initial.clone();
        self.history = VecDeque::from([initial]);
    }

    pub fn can_rollback(&self) -> bool {
        self.history.len() > 1
    }

    /// 弹出当前状态，回到上一个状态
    pub fn rollback(&mut self) -> bool {
        if !self.can_rollback() {
            return false;
        }
        self.history.pop_back();
        match self.history.back() {
            Some(prev) => {
                tracing::info!(from = %self.current, to = %prev, "state rollback");
                self.current = prev.clone();
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            current: self.current.clone(),
            history: self.state_history(),
        }
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}
