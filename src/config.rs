//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MINDMAP__*` 覆盖（双下划线表示嵌套，如 `MINDMAP__LLM__PROVIDER=openai`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::RetryPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub registry: RegistrySection,
    pub mutation: MutationSection,
}

/// [app] 段：应用名、对话轮数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 对话历史保留轮数
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_turns: default_max_context_turns(),
        }
    }
}

fn default_max_context_turns() -> usize {
    10
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock；openai 缺少 OPENAI_API_KEY 时退回 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [orchestrator] 段：重试预算、退避、历史上限、初始状态与学习者等级
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_system_error_retries")]
    pub system_error_retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_initial_state")]
    pub initial_state: String,
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            system_error_retries: default_system_error_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            history_limit: default_history_limit(),
            initial_state: default_initial_state(),
            level: default_level(),
        }
    }
}

impl OrchestratorSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            self.system_error_retries,
            Duration::from_millis(self.retry_delay_ms),
        )
    }
}

fn default_max_retries() -> usize {
    3
}

fn default_system_error_retries() -> usize {
    5
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_history_limit() -> usize {
    10
}

fn default_initial_state() -> String {
    "idle".to_string()
}

fn default_level() -> String {
    "L2".to_string()
}

/// [registry] 段：外部注册表文件（TOML 或 JSON）；未设置时使用内置目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RegistrySection {
    pub actions_path: Option<PathBuf>,
    pub states_path: Option<PathBuf>,
    pub forms_path: Option<PathBuf>,
}

/// [mutation] 段：单次 mindmap 修改超时
#[derive(Debug, Clone, Deserialize)]
pub struct MutationSection {
    #[serde(default = "default_mutation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MutationSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_mutation_timeout_secs(),
        }
    }
}

fn default_mutation_timeout_secs() -> u64 {
    30
}

/// 从 config 目录加载配置，环境变量 MINDMAP__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MINDMAP__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();
    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }
    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignored");
        }
    }
    builder = builder.add_source(
        config::Environment::with_prefix("MINDMAP")
            .separator("__")
            .try_parsing(true),
    );
    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_context_turns, 10);
        assert_eq!(cfg.orchestrator.max_retries, 3);
        assert_eq!(cfg.orchestrator.system_error_retries, 5);
        assert_eq!(cfg.orchestrator.initial_state, "idle");
        assert_eq!(cfg.mutation.timeout_secs, 30);
        let policy = cfg.orchestrator.retry_policy();
        assert_eq!(policy.delay, Duration::from_secs(1));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[llm]
provider = "mock"

[orchestrator]
max_retries = 2
retry_delay_ms = 10

[registry]
states_path = "states.json"
"#,
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.orchestrator.max_retries, 2);
        assert_eq!(cfg.orchestrator.history_limit, 10);
        assert_eq!(
            cfg.registry.states_path.as_deref(),
            Some(Path::new("states.json"))
        );
    }
}
