//! 编排层错误类型
//!
//! AgentError 覆盖 LLM 回复解析、schema 校验、传输、系统错误与重试耗尽；
//! RecoveryEngine 依据错误类型决定重试预算与是否回灌错误上下文。
//! RegistryError 只出现在加载注册表（actions / states / forms）时。

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// 系统错误代码：LLM 给出的动作引用了当前 mindmap 中不存在的对象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemErrorCode {
    StepIdRequired,
    TopicNotFound,
    StepNotFound,
    NoSteps,
}

impl SystemErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemErrorCode::StepIdRequired => "STEP_ID_REQUIRED",
            SystemErrorCode::TopicNotFound => "TOPIC_NOT_FOUND",
            SystemErrorCode::StepNotFound => "STEP_NOT_FOUND",
            SystemErrorCode::NoSteps => "NO_STEPS",
        }
    }
}

impl fmt::Display for SystemErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// LLM 调用失败；message 面向用户
    #[error("{message}")]
    Transport { status: Option<u16>, message: String },

    /// 有独立（更高）重试预算，且 message 会回灌给下一轮 LLM
    #[error("{message}")]
    System {
        code: SystemErrorCode,
        message: String,
    },

    #[error("Failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: String },

    #[error("Mutation failed: {0}")]
    MutationFailed(String),

    #[error("Mutation timeout: {0}")]
    MutationTimeout(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 按 HTTP 状态码分类传输错误：>=500 服务繁忙，>=400 请求有误
    pub fn from_status(status: u16) -> Self {
        let message = if status >= 500 {
            "服务暂时不可用，请稍后再试".to_string()
        } else if status >= 400 {
            "请求似乎有点问题，请检查后再试".to_string()
        } else {
            format!("意外的响应状态：{status}")
        };
        AgentError::Transport {
            status: Some(status),
            message,
        }
    }

    pub fn system(code: SystemErrorCode, message: impl Into<String>) -> Self {
        AgentError::System {
            code,
            message: message.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, AgentError::System { .. })
    }
}

impl From<RegistryError> for AgentError {
    fn from(e: RegistryError) -> Self {
        AgentError::Config(e.to_string())
    }
}

/// 注册表加载与交叉校验错误（加载时即失败，不拖到第一次使用）
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("{what} registry is empty")]
    Empty { what: &'static str },

    #[error("action {action}: duplicate parameter {param}")]
    DuplicateParam { action: String, param: String },

    #[error("action {action}: parameter {param} declares items but is not an array")]
    ItemsOnScalar { action: String, param: String },

    #[error("state {state}: transition {event} targets undeclared state {target}")]
    UnknownTarget {
        state: String,
        event: String,
        target: String,
    },

    #[error("state {state}: default tool {tool} is not in the action registry")]
    UnknownTool { state: String, tool: String },

    #[error("form {form}: {detail}")]
    InvalidForm { form: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        match AgentError::from_status(503) {
            AgentError::Transport { status, message } => {
                assert_eq!(status, Some(503));
                assert!(message.contains("不可用"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match AgentError::from_status(400) {
            AgentError::Transport { message, .. } => assert!(message.contains("请求")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_retries_exhausted_message() {
        let err = AgentError::RetriesExhausted {
            attempts: 3,
            last: "boom".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains('3'));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_system_code_display() {
        let err = AgentError::system(SystemErrorCode::NoSteps, "need steps");
        assert!(err.is_system());
        assert_eq!(SystemErrorCode::NoSteps.to_string(), "NO_STEPS");
        assert_eq!(err.to_string(), "need steps");
    }
}
