//! 状态层：状态注册表、状态机查询、运行时状态控制器

pub mod controller;
pub mod machine;
pub mod states;

pub use controller::{
    ControllerSnapshot, GateReason, GateResult, StateController, TransitionSuggestion,
    DEFAULT_HISTORY_LIMIT,
};
pub use machine::StateMachine;
pub use states::{StateConfig, StateRegistry};
