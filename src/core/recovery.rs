//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供编排器决定重试预算与是否回灌错误上下文。
//! 系统错误（LLM 引用了不存在的对象）获得更高预算，并把错误信息加上 `[[system]]` 前缀交给下一轮。

use std::time::Duration;

use crate::core::AgentError;

/// 回灌上下文的前缀
pub const SYSTEM_CONTEXT_PREFIX: &str = "[[system]]";

/// 重试策略（次数包含第一次尝试）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub system_error_retries: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            system_error_retries: 5,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, system_error_retries: usize, delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            system_error_retries: system_error_retries.max(1),
            delay,
        }
    }
}

/// 一次失败后的恢复动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 按当前预算重试，不附加上下文
    Retry,
    /// 提高预算到 budget，并在下一轮输入前附加 context
    RetryWithContext { budget: usize, context: String },
}

#[derive(Debug, Clone, Default)]
pub struct RecoveryEngine {
    policy: RetryPolicy,
}

impl RecoveryEngine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::System { code, message } => {
                tracing::debug!(code = %code, "system error, raising retry budget");
                RecoveryAction::RetryWithContext {
                    budget: self.policy.system_error_retries,
                    context: format!("{SYSTEM_CONTEXT_PREFIX} {message}"),
                }
            }
            _ => RecoveryAction::Retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SystemErrorCode;

    #[test]
    fn test_system_error_raises_budget() {
        let engine = RecoveryEngine::default();
        let err = AgentError::system(SystemErrorCode::StepNotFound, "找不到步骤「记录」");
        match engine.handle(&err) {
            RecoveryAction::RetryWithContext { budget, context } => {
                assert_eq!(budget, 5);
                assert_eq!(context, "[[system]] 找不到步骤「记录」");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_other_errors_plain_retry() {
        let engine = RecoveryEngine::default();
        for err in [
            AgentError::Parse("x".into()),
            AgentError::SchemaValidation("y".into()),
            AgentError::UnknownTool("z".into()),
            AgentError::from_status(503),
        ] {
            assert_eq!(engine.handle(&err), RecoveryAction::Retry);
        }
    }

    #[test]
    fn test_policy_clamps_to_one_attempt() {
        let p = RetryPolicy::new(0, 0, Duration::ZERO);
        assert_eq!(p.max_retries, 1);
        assert_eq!(p.system_error_retries, 1);
        assert_eq!(RetryPolicy::default().delay, Duration::from_secs(1));
    }
}
