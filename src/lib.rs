//! Mindmap Agent - 学习规划助手的状态门控动作编排核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **context**: mindmap 快照与订阅（含内存实现）
//! - **core**: 编排器、错误与恢复、构建器、会话存储
//! - **fsm**: 状态注册表、状态机查询、状态控制器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、prompt、对话服务
//! - **memory**: 对话记忆
//! - **observability**: tracing 初始化
//! - **tools**: 动作注册表、回复解析校验、选项描述、动作执行器

pub mod config;
pub mod context;
pub mod core;
pub mod fsm;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;

pub use crate::core::{AgentError, Orchestrator, OrchestratorBuilder, SessionStore};
pub use crate::tools::{ActionKind, LlmResponse};
