//! LLM 回复解析与参数校验
//!
//! 把原始文本解析为 `{tool, params, message}` 并按动作注册表校验参数。
//! 只依赖 ActionRegistry，不接触状态控制器（门控是之后独立的一步）。

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::tools::{ActionForm, ActionKind, ActionRegistry, ItemShape, ParamSpec, ParamType};

/// 错误信息中引用原文时的最大字符数
const PREVIEW_CHARS: usize = 200;

/// 校验通过的 LLM 回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub tool: ActionKind,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<ActionForm>,
}

impl LlmResponse {
    /// 纯对话回复（不带参数与选项）
    pub fn chat(message: impl Into<String>) -> Self {
        Self {
            tool: ActionKind::Chat,
            params: Map::new(),
            message: Some(message.into()),
            form: None,
        }
    }

    pub fn message_text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

fn message_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""message"\s*:\s*""#).expect("valid message key regex"))
}

/// 只转义 `message` 字符串值内的裸换行（LLM 常在该字段里直接换行）；其它字段原样保留
pub fn repair_message_newlines(raw: &str) -> Cow<'_, str> {
    let Some(m) = message_key().find(raw) else {
        return Cow::Borrowed(raw);
    };
    let value_start = m.end();
    let value = &raw[value_start..];

    let mut value_end = value.len();
    let mut escaped = false;
    for (i, ch) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => {
                value_end = i;
                break;
            }
            _ => {}
        }
    }

    let body = &value[..value_end];
    if !body.contains(&['\n', '\r'][..]) {
        return Cow::Borrowed(raw);
    }
    let fixed = body.replace("\r\n", "\\n").replace('\n', "\\n").replace('\r', "\\n");
    let mut out = String::with_capacity(raw.len() + 8);
    out.push_str(&raw[..value_start]);
    out.push_str(&fixed);
    out.push_str(&value[value_end..]);
    Cow::Owned(out)
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

fn missing(name: &str) -> AgentError {
    AgentError::SchemaValidation(format!("missing required parameter: {name}"))
}

/// 回复解析器 + schema 校验器
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    registry: Arc<ActionRegistry>,
}

impl ResponseValidator {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self { registry }
    }

    /// 解析并校验原始回复文本
    pub fn parse(&self, raw: &str) -> Result<LlmResponse, AgentError> {
        let trimmed = raw.trim();
        if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
            return Err(AgentError::Parse(format!(
                "response is not a JSON object: {}",
                preview(trimmed)
            )));
        }

        let repaired = repair_message_newlines(trimmed);
        if matches!(repaired, Cow::Owned(_)) {
            tracing::debug!("escaped raw newlines inside message field");
        }

        let value: Value = serde_json::from_str(&repaired)
            .map_err(|e| AgentError::Parse(format!("{}: {}", e, preview(trimmed))))?;
        let Value::Object(mut obj) = value else {
            return Err(AgentError::Parse(format!(
                "response is not a JSON object: {}",
                preview(trimmed)
            )));
        };

        let tool_name = match obj.get("tool") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => return Err(AgentError::UnknownTool(other.to_string())),
            None => return Err(missing("tool")),
        };
        let (kind, _) = self
            .registry
            .resolve(&tool_name)
            .ok_or_else(|| AgentError::UnknownTool(tool_name.clone()))?;

        let params = match obj.remove("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(AgentError::SchemaValidation(
                    "params must be an object".to_string(),
                ))
            }
        };

        let message = match obj.remove("message") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => {
                return Err(AgentError::SchemaValidation(
                    "message must be a string".to_string(),
                ))
            }
        };

        self.validate_params(kind, &params)?;

        Ok(LlmResponse {
            tool: kind,
            params,
            message,
            form: None,
        })
    }

    /// 按注册表校验参数：必填、标量类型、数组元素形状
    pub fn validate_params(
        &self,
        kind: ActionKind,
        params: &Map<String, Value>,
    ) -> Result<(), AgentError> {
        let def = self
            .registry
            .get(kind)
            .ok_or_else(|| AgentError::UnknownTool(kind.to_string()))?;

        for spec in &def.params {
            match params.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(missing(&spec.name));
                    }
                }
                Some(Value::String(s)) if spec.required && s.trim().is_empty() => {
                    return Err(missing(&spec.name));
                }
                Some(value) => check_value(spec, value)?,
            }
        }
        Ok(())
    }
}

fn check_value(spec: &ParamSpec, value: &Value) -> Result<(), AgentError> {
    let name = &spec.name;
    let ok = match spec.param_type {
        ParamType::String => value.is_string(),
        ParamType::Number => value.is_number(),
        ParamType::Boolean => value.is_boolean(),
        ParamType::Array => {
            let Some(items) = value.as_array() else {
                return Err(AgentError::SchemaValidation(format!(
                    "parameter {name} should be an array"
                )));
            };
            return check_items(spec, items);
        }
    };
    if ok {
        Ok(())
    } else {
        Err(AgentError::SchemaValidation(format!(
            "parameter {name} should be a {}",
            spec.param_type.as_str()
        )))
    }
}

fn check_items(spec: &ParamSpec, items: &[Value]) -> Result<(), AgentError> {
    let name = &spec.name;
    match &spec.items {
        None => Ok(()),
        Some(ItemShape::String) => {
            if items.iter().all(Value::is_string) {
                Ok(())
            } else {
                Err(AgentError::SchemaValidation(format!(
                    "array items in {name} should be strings"
                )))
            }
        }
        Some(shape @ ItemShape::Object { .. }) => {
            let required = shape.required_properties();
            for item in items {
                let Some(obj) = item.as_object() else {
                    return Err(AgentError::SchemaValidation(format!(
                        "array items in {name} should be objects"
                    )));
                };
                if let Some(prop) = required.iter().find(|p| !obj.contains_key(**p)) {
                    return Err(AgentError::SchemaValidation(format!(
                        "missing required property {prop} in array item of {name}"
                    )));
                }
            }
            Ok(())
        }
    }
}
