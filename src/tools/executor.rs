//! 动作执行器
//!
//! 持有 MutationApi 与全局超时，execute(action) 在超时内调用 api.apply，
//! 超时或失败时转为 AgentError（MutationTimeout / MutationFailed）；每次调用输出结构化审计日志（JSON）。
//! chat 不会修改 mindmap，直接返回 Null。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::Action;

/// mindmap 的修改接口（外部协作方）
#[async_trait]
pub trait MutationApi: Send + Sync {
    async fn apply(&self, action: &Action) -> Result<Value, String>;
}

#[derive(Clone)]
pub struct MutationExecutor {
    api: Arc<dyn MutationApi>,
    timeout: Duration,
}

impl MutationExecutor {
    pub fn new(api: Arc<dyn MutationApi>, timeout_secs: u64) -> Self {
        Self {
            api,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub async fn execute(&self, action: &Action) -> Result<Value, AgentError> {
        if !action.kind().is_mutation() {
            return Ok(Value::Null);
        }
        let start = Instant::now();
        let result = timeout(self.timeout, self.api.apply(action)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "mutation_audit",
            "action": action.kind().as_str(),
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "payload_preview": payload_preview(action),
        });
        tracing::info!(audit = %audit.to_string(), "mutation");

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AgentError::MutationFailed(e)),
            Err(_) => Err(AgentError::MutationTimeout(action.kind().to_string())),
        }
    }
}

fn payload_preview(action: &Action) -> String {
    let s = serde_json::to_string(action).unwrap_or_default();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::TaskDraft;

    struct Slow;

    #[async_trait]
    impl MutationApi for Slow {
        async fn apply(&self, _action: &Action) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    struct Failing;

    #[async_trait]
    impl MutationApi for Failing {
        async fn apply(&self, _action: &Action) -> Result<Value, String> {
            Err("topic is locked".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_error() {
        let exec = MutationExecutor::new(Arc::new(Slow), 1);
        let err = exec.execute(&Action::CompleteTopic).await.unwrap_err();
        assert!(matches!(err, AgentError::MutationTimeout(_)));
    }

    #[tokio::test]
    async fn test_failure_maps_to_error() {
        let exec = MutationExecutor::new(Arc::new(Failing), 5);
        let action = Action::CreateTask(TaskDraft {
            task_name: "a".into(),
            step_tag: "b".into(),
        });
        match exec.execute(&action).await.unwrap_err() {
            AgentError::MutationFailed(msg) => assert_eq!(msg, "topic is locked"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_skips_api() {
        let exec = MutationExecutor::new(Arc::new(Failing), 5);
        assert_eq!(exec.execute(&Action::Chat).await.unwrap(), Value::Null);
    }
}
