//! 编排器构建器：统一的初始化逻辑
//!
//! 加载并交叉校验三份注册表（actions / states / forms），组装对话服务、状态控制器与执行器。
//! CLI、会话存储与测试共用同一套构建流程。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::context::ContextProvider;
use crate::core::{AgentError, Orchestrator, RecoveryEngine, RetryPolicy};
use crate::fsm::{StateController, StateMachine, StateRegistry, DEFAULT_HISTORY_LIMIT};
use crate::llm::{ChatService, LearnerLevel, LlmClient, MockLlmClient, OpenAiClient, PromptBuilder};
use crate::tools::{ActionRegistry, FormRegistry, MutationApi, MutationExecutor, ResponseValidator};

const DEFAULT_MAX_TURNS: usize = 10;
const DEFAULT_MUTATION_TIMEOUT_SECS: u64 = 30;

/// 编排器构建器；可 Clone，供会话存储按需为每个会话构建新实例
#[derive(Clone)]
pub struct OrchestratorBuilder {
    llm: Arc<dyn LlmClient>,
    actions: Option<Arc<ActionRegistry>>,
    states: Option<Arc<StateRegistry>>,
    forms: Option<Arc<FormRegistry>>,
    mutation: Option<Arc<dyn MutationApi>>,
    context: Option<Arc<dyn ContextProvider>>,
    policy: RetryPolicy,
    history_limit: usize,
    max_turns: usize,
    mutation_timeout_secs: u64,
    initial_state: String,
    level: LearnerLevel,
}

impl OrchestratorBuilder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            actions: None,
            states: None,
            forms: None,
            mutation: None,
            context: None,
            policy: RetryPolicy::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_turns: DEFAULT_MAX_TURNS,
            mutation_timeout_secs: DEFAULT_MUTATION_TIMEOUT_SECS,
            initial_state: "idle".to_string(),
            level: LearnerLevel::default(),
        }
    }

    /// 从应用配置创建：注册表路径、重试策略、历史上限、初始状态与等级
    pub fn from_config(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Self, AgentError> {
        let mut builder = Self::new(llm)
            .with_retry_policy(cfg.orchestrator.retry_policy())
            .with_history_limit(cfg.orchestrator.history_limit)
            .with_max_turns(cfg.app.max_context_turns)
            .with_initial_state(cfg.orchestrator.initial_state.clone())
            .with_level(
                cfg.orchestrator
                    .level
                    .parse::<LearnerLevel>()
                    .map_err(AgentError::Config)?,
            );
        builder.mutation_timeout_secs = cfg.mutation.timeout_secs;

        if let Some(path) = &cfg.registry.actions_path {
            builder.actions = Some(Arc::new(ActionRegistry::load(path)?));
        }
        if let Some(path) = &cfg.registry.states_path {
            builder.states = Some(Arc::new(StateRegistry::load(path)?));
        }
        if let Some(path) = &cfg.registry.forms_path {
            builder.forms = Some(Arc::new(FormRegistry::load(path)?));
        }
        Ok(builder)
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = Some(Arc::new(actions));
        self
    }

    pub fn with_states(mut self, states: StateRegistry) -> Self {
        self.states = Some(Arc::new(states));
        self
    }

    pub fn with_forms(mut self, forms: FormRegistry) -> Self {
        self.forms = Some(Arc::new(forms));
        self
    }

    pub fn with_mutation_api(mut self, api: Arc<dyn MutationApi>) -> Self {
        self.mutation = Some(api);
        self
    }

    pub fn with_context(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(provider);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_max_turns(mut self, turns: usize) -> Self {
        self.max_turns = turns;
        self
    }

    pub fn with_initial_state(mut self, state: impl Into<String>) -> Self {
        self.initial_state = state.into();
        self
    }

    pub fn with_level(mut self, level: LearnerLevel) -> Self {
        self.level = level;
        self
    }

    /// 构建编排器；未指定的注册表使用内置目录，三份注册表在此交叉校验
    pub fn build(&self) -> Result<Orchestrator, AgentError> {
        let actions = match &self.actions {
            Some(a) => a.clone(),
            None => Arc::new(ActionRegistry::builtin()?),
        };
        let states = match &self.states {
            Some(s) => s.clone(),
            None => Arc::new(StateRegistry::builtin()?),
        };
        let forms = match &self.forms {
            Some(f) => f.clone(),
            None => Arc::new(FormRegistry::builtin()?),
        };
        states.check_tools(&actions)?;
        forms.check(&actions)?;

        if !states.contains(&self.initial_state) {
            return Err(AgentError::Config(format!(
                "initial state {} is not declared",
                self.initial_state
            )));
        }

        let controller = StateController::new(StateMachine::new(states), self.initial_state.clone())
            .with_history_limit(self.history_limit);
        let chat = ChatService::new(
            self.llm.clone(),
            PromptBuilder::new(actions.clone()),
            self.max_turns,
        );

        Ok(Orchestrator {
            chat,
            controller,
            validator: ResponseValidator::new(actions.clone()),
            actions,
            forms,
            executor: self
                .mutation
                .as_ref()
                .map(|api| MutationExecutor::new(api.clone(), self.mutation_timeout_secs)),
            context: self.context.as_ref().map(|p| p.subscribe()),
            recovery: RecoveryEngine::new(self.policy.clone()),
            level: self.level,
            error_context: None,
        })
    }
}

/// 根据配置创建 LLM 客户端：provider = openai 且有 OPENAI_API_KEY 时用 OpenAI 兼容端点，否则用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());

    match (provider.as_str(), api_key) {
        ("openai", Some(key)) => {
            tracing::info!(model = %cfg.llm.model, "Using OpenAI-compatible LLM");
            let client = OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
                cfg.llm.temperature,
                Duration::from_secs(cfg.llm.timeouts.request),
            )
            .map_err(|e| AgentError::Config(e.to_string()))?;
            Ok(Arc::new(client))
        }
        ("mock", _) => {
            tracing::info!("Using Mock LLM");
            Ok(Arc::new(MockLlmClient::new()))
        }
        (other, _) => {
            tracing::warn!(provider = other, "No API key set or provider unknown, using Mock LLM");
            Ok(Arc::new(MockLlmClient::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_builtin_registries() {
        let orch = OrchestratorBuilder::new(Arc::new(MockLlmClient::new()))
            .with_history_limit(4)
            .build()
            .unwrap();
        assert_eq!(orch.controller().current_state(), "idle");
        assert_eq!(orch.level(), LearnerLevel::L2);
        assert!(orch.pending_error_context().is_none());
    }

    #[test]
    fn test_unknown_initial_state_rejected() {
        let result = OrchestratorBuilder::new(Arc::new(MockLlmClient::new()))
            .with_initial_state("limbo")
            .build();
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[test]
    fn test_from_config_bad_level() {
        let mut cfg = AppConfig::default();
        cfg.orchestrator.level = "L7".into();
        let result = OrchestratorBuilder::from_config(&cfg, Arc::new(MockLlmClient::new()));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[test]
    fn test_from_config_missing_registry_file() {
        let mut cfg = AppConfig::default();
        cfg.registry.actions_path = Some("does/not/exist.toml".into());
        let result = OrchestratorBuilder::from_config(&cfg, Arc::new(MockLlmClient::new()));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[test]
    fn test_mock_provider() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        assert!(create_llm_from_config(&cfg).is_ok());
    }
}
