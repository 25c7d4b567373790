//! 回复格式 JSON Schema 生成（schemars）
//!
//! 用于将「合法回复」的 JSON 结构注入 system prompt，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};
use std::collections::HashMap;

/// 回复格式：`{"tool": "...", "params": {...}, "message": "..."}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，必须是当前状态可用的工具之一
    pub tool: String,
    /// 工具参数，依工具不同而不同
    pub params: HashMap<String, serde_json::Value>,
    /// 给学习者看的话
    pub message: String,
}

/// 返回回复格式的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_names_fields() {
        let schema = tool_call_schema_json();
        assert!(schema.contains("\"tool\""));
        assert!(schema.contains("\"params\""));
        assert!(schema.contains("\"message\""));
    }
}
