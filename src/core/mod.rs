//! 核心编排层：错误与恢复、编排器、构建器、会话存储

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_store;

pub use builder::{create_llm_from_config, OrchestratorBuilder};
pub use error::{AgentError, RegistryError, SystemErrorCode};
pub use orchestrator::{GateOutcome, Orchestrator, USER_INPUT_EVENT};
pub use recovery::{RecoveryAction, RecoveryEngine, RetryPolicy, SYSTEM_CONTEXT_PREFIX};
pub use session_store::{SessionHandle, SessionStore};
