pub mod action;
pub mod executor;
pub mod form;
pub mod registry;
pub mod schema;
pub mod validator;

pub use action::{Action, ActionCall, TaskDraft, TEMPLATE_STEPS};
pub use executor::{MutationApi, MutationExecutor};
pub use form::{ActionForm, FormConfig, FormOption, FormRegistry, OptionAction};
pub use registry::{ActionDefinition, ActionKind, ActionRegistry, ItemShape, ParamSpec, ParamType};
pub use schema::tool_call_schema_json;
pub use validator::{repair_message_newlines, LlmResponse, ResponseValidator};
