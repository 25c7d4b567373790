//! 状态机查询层：基于 StateRegistry 的纯函数查询，不持有运行时状态
//!
//! 未知状态或事件一律返回 None / 空列表，从不报错。

use std::sync::Arc;

use crate::fsm::{StateConfig, StateRegistry};
use crate::tools::ActionKind;

#[derive(Debug, Clone)]
pub struct StateMachine {
    registry: Arc<StateRegistry>,
}

impl StateMachine {
    pub fn new(registry: Arc<StateRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<StateRegistry> {
        &self.registry
    }

    pub fn next_state(&self, current: &str, event: &str) -> Option<String> {
        self.registry
            .get(current)
            .and_then(|s| s.transitions.get(event))
            .cloned()
    }

    pub fn state(&self, name: &str) -> Option<&StateConfig> {
        self.registry.get(name)
    }

    pub fn state_names(&self) -> Vec<String> {
        self.registry.names().map(String::from).collect()
    }

    pub fn is_valid_state(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn available_events(&self, current: &str) -> Vec<String> {
        self.registry
            .get(current)
            .map(|s| s.transitions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn available_tools(&self, current: &str) -> Vec<ActionKind> {
        self.registry
            .get(current)
            .map(|s| s.default_tools.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> StateMachine {
        StateMachine::new(Arc::new(StateRegistry::builtin().unwrap()))
    }

    #[test]
    fn test_next_state() {
        let m = machine();
        assert_eq!(m.next_state("idle", "topic_selected").as_deref(), Some("exploration"));
        assert_eq!(m.next_state("idle", "task_completed"), None);
        assert_eq!(m.next_state("nowhere", "topic_selected"), None);
    }

    #[test]
    fn test_unknown_state_queries_are_empty() {
        let m = machine();
        assert!(!m.is_valid_state("nowhere"));
        assert!(m.available_events("nowhere").is_empty());
        assert!(m.available_tools("nowhere").is_empty());
        assert!(m.state("nowhere").is_none());
    }

    #[test]
    fn test_available_tools_and_events() {
        let m = machine();
        assert!(m.available_tools("paused").contains(&ActionKind::Chat));
        assert!(!m.available_tools("paused").contains(&ActionKind::CreateTask));
        let events = m.available_events("paused");
        assert!(events.contains(&"resume".to_string()));
        assert!(m.state_names().contains(&"idle".to_string()));
    }
}
