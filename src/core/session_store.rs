//! 会话存储
//!
//! 会话 id -> 编排器。每个会话独占一个编排器（状态控制器、对话记忆、错误上下文都不共享），
//! 同一会话的请求经由 Mutex 串行执行，不同会话互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::core::{AgentError, Orchestrator, OrchestratorBuilder};
use crate::tools::LlmResponse;

pub type SessionHandle = Arc<Mutex<Orchestrator>>;

pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    factory: OrchestratorBuilder,
}

impl SessionStore {
    pub fn new(factory: OrchestratorBuilder) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// 新建会话，返回会话 id
    pub async fn create(&self) -> Result<String, AgentError> {
        let id = Uuid::new_v4().to_string();
        let orch = self.factory.build()?;
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(orch)));
        tracing::info!(session = %id, "session created");
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn get_or_create(&self, id: &str) -> Result<SessionHandle, AgentError> {
        if let Some(handle) = self.get(id).await {
            return Ok(handle);
        }
        let mut sessions = self.sessions.write().await;
        // 拿写锁期间可能已被其他请求创建
        if let Some(handle) = sessions.get(id) {
            return Ok(handle.clone());
        }
        let handle = Arc::new(Mutex::new(self.factory.build()?));
        sessions.insert(id.to_string(), handle.clone());
        tracing::info!(session = %id, "session created");
        Ok(handle)
    }

    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::info!(session = %id, "session removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// 把输入交给对应会话的编排器（会话不存在时创建）
    pub async fn handle(&self, id: &str, input: &str) -> Result<LlmResponse, AgentError> {
        let handle = self.get_or_create(id).await?;
        let mut orch = handle.lock().await;
        orch.handle_user_input(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn store() -> SessionStore {
        let mock = Arc::new(MockLlmClient::scripted([Ok(
            r#"{"tool":"create_topic","params":{"topic":"蚂蚁"},"message":"好"}"#.to_string(),
        )]));
        SessionStore::new(OrchestratorBuilder::new(mock))
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_state() {
        let store = store();
        let a = store.create().await.unwrap();
        let b = store.create().await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);

        store.handle(&a, "我想研究蚂蚁").await.unwrap();
        let state_of = |handle: SessionHandle| async move {
            handle.lock().await.controller().current_state().to_string()
        };
        let a_state = state_of(store.get(&a).await.unwrap()).await;
        let b_state = state_of(store.get(&b).await.unwrap()).await;
        assert_eq!(a_state, "exploration");
        assert_eq!(b_state, "idle");
    }

    #[tokio::test]
    async fn test_get_or_create_and_remove() {
        let store = store();
        let first = store.get_or_create("s1").await.unwrap();
        let again = store.get_or_create("s1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(store.remove("s1").await);
        assert!(!store.remove("s1").await);
        assert!(store.is_empty().await);
    }
}
