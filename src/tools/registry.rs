//! 动作注册表
//!
//! 静态目录：工具名 -> 描述 + 参数 schema（必填 / 标量或数组，数组可声明元素形状）。
//! 工具名是封闭的 ActionKind 枚举，注册表文件里出现未知工具名会在加载时直接失败。
//! 支持 TOML 与 JSON 两种格式；内置一份默认目录（config/actions.toml）。

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::RegistryError;

const BUILTIN_ACTIONS: &str = include_str!("../../config/actions.toml");

/// LLM 可以请求的全部动作（封闭集合，匹配时由编译器保证穷尽）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Chat,
    CreateTopic,
    CreateStep,
    CreateTask,
    SuggestSteps,
    SuggestTasks,
    UseTemplateSteps,
    CompleteTopic,
    MarkAsBookmark,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::Chat,
        ActionKind::CreateTopic,
        ActionKind::CreateStep,
        ActionKind::CreateTask,
        ActionKind::SuggestSteps,
        ActionKind::SuggestTasks,
        ActionKind::UseTemplateSteps,
        ActionKind::CompleteTopic,
        ActionKind::MarkAsBookmark,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Chat => "chat",
            ActionKind::CreateTopic => "create_topic",
            ActionKind::CreateStep => "create_step",
            ActionKind::CreateTask => "create_task",
            ActionKind::SuggestSteps => "suggest_steps",
            ActionKind::SuggestTasks => "suggest_tasks",
            ActionKind::UseTemplateSteps => "use_template_steps",
            ActionKind::CompleteTopic => "complete_topic",
            ActionKind::MarkAsBookmark => "mark_as_bookmark",
        }
    }

    /// 是否会修改 mindmap（chat 只是对话）
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ActionKind::Chat)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown action: {s}"))
    }
}

/// 参数基础类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
        }
    }
}

/// 数组元素形状：字符串，或带一组必需属性的对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemShape {
    String,
    Object {
        #[serde(default)]
        required: Vec<String>,
        /// JSON 注册表的写法（properties: {name: {type}}）；未给 required 时，声明的属性即必需属性
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        properties: BTreeMap<String, serde_json::Value>,
    },
}

impl ItemShape {
    pub fn required_properties(&self) -> Vec<&str> {
        match self {
            ItemShape::String => Vec::new(),
            ItemShape::Object {
                required,
                properties,
            } => {
                if required.is_empty() {
                    properties.keys().map(String::as_str).collect()
                } else {
                    required.iter().map(String::as_str).collect()
                }
            }
        }
    }
}

/// 单个参数定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ItemShape>,
}

impl ParamSpec {
    /// 供 prompt 使用的类型描述
    pub fn type_description(&self) -> String {
        match (&self.param_type, &self.items) {
            (ParamType::Array, Some(ItemShape::String)) => "array of string".to_string(),
            (ParamType::Array, Some(shape @ ItemShape::Object { .. })) => format!(
                "array of objects with properties: {{{}}}",
                shape.required_properties().join(", ")
            ),
            (t, _) => t.as_str().to_string(),
        }
    }
}

/// 参数体（JSON 注册表按 name -> 定义 的映射书写时使用）
#[derive(Debug, Deserialize)]
struct ParamBody {
    #[serde(rename = "type")]
    param_type: ParamType,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: String,
    #[serde(default)]
    items: Option<ItemShape>,
}

/// 映射形式的 params，保留文件中的声明顺序（决定 prompt 中的参数顺序）
struct OrderedParams(Vec<(String, ParamBody)>);

impl<'de> Deserialize<'de> for OrderedParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = OrderedParams;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter name to definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, ParamBody>()? {
                    entries.push(entry);
                }
                Ok(OrderedParams(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// params 既可写成有序列表，也可写成 name -> 定义 的映射
fn deserialize_params<'de, D>(deserializer: D) -> Result<Vec<ParamSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawParams {
        List(Vec<ParamSpec>),
        Map(OrderedParams),
    }

    Ok(match RawParams::deserialize(deserializer)? {
        RawParams::List(list) => list,
        RawParams::Map(OrderedParams(entries)) => entries
            .into_iter()
            .map(|(name, body)| ParamSpec {
                name,
                param_type: body.param_type,
                required: body.required,
                description: body.description,
                items: body.items,
            })
            .collect(),
    })
}

/// 动作定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_params")]
    pub params: Vec<ParamSpec>,
    /// 动作被接受后触发的状态事件
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
}

impl ActionDefinition {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Deserialize)]
struct ActionsFile {
    actions: BTreeMap<String, ActionDefinition>,
}

impl ActionsFile {
    fn into_typed(self) -> Result<BTreeMap<ActionKind, ActionDefinition>, RegistryError> {
        self.actions
            .into_iter()
            .map(|(name, def)| {
                let kind = name.parse::<ActionKind>().map_err(|detail| RegistryError::Parse {
                    what: "action registry",
                    detail,
                })?;
                Ok((kind, def))
            })
            .collect()
    }
}

/// 动作注册表：加载后不可变，按 ActionKind 查找
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    actions: BTreeMap<ActionKind, ActionDefinition>,
}

impl ActionRegistry {
    /// 内置默认目录
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_toml_str(BUILTIN_ACTIONS)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, RegistryError> {
        let file: ActionsFile = parse_toml(text, "action registry")?;
        Self::new(file.into_typed()?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, RegistryError> {
        let file: ActionsFile = parse_json(text, "action registry")?;
        Self::new(file.into_typed()?)
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let file: ActionsFile = read_document(path, "action registry")?;
        Self::new(file.into_typed()?)
    }

    /// 加载时校验：非空、参数名唯一、items 只能出现在数组参数上
    pub fn new(actions: BTreeMap<ActionKind, ActionDefinition>) -> Result<Self, RegistryError> {
        if actions.is_empty() {
            return Err(RegistryError::Empty { what: "action" });
        }
        for (kind, def) in &actions {
            let mut seen = HashSet::new();
            for p in &def.params {
                if !seen.insert(p.name.as_str()) {
                    return Err(RegistryError::DuplicateParam {
                        action: kind.to_string(),
                        param: p.name.clone(),
                    });
                }
                if p.items.is_some() && p.param_type != ParamType::Array {
                    return Err(RegistryError::ItemsOnScalar {
                        action: kind.to_string(),
                        param: p.name.clone(),
                    });
                }
            }
        }
        Ok(Self { actions })
    }

    pub fn get(&self, kind: ActionKind) -> Option<&ActionDefinition> {
        self.actions.get(&kind)
    }

    /// 按工具名字符串解析；未知名或未注册的动作返回 None
    pub fn resolve(&self, name: &str) -> Option<(ActionKind, &ActionDefinition)> {
        let kind = name.parse::<ActionKind>().ok()?;
        self.actions.get(&kind).map(|def| (kind, def))
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.actions.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        self.actions.keys().copied().collect()
    }

    /// 生成 prompt 中的动作说明（只包含传入的动作）
    pub fn describe(&self, kinds: &[ActionKind]) -> String {
        kinds
            .iter()
            .filter_map(|k| self.actions.get(k).map(|def| (k, def)))
            .map(|(kind, def)| {
                let params = if def.params.is_empty() {
                    "    (none)".to_string()
                } else {
                    def.params
                        .iter()
                        .map(|p| {
                            format!(
                                "    {}{}: {} ({})",
                                p.name,
                                if p.required { " (required)" } else { "" },
                                p.description,
                                p.type_description()
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                format!(
                    "{}:\n  Description: {}\n  Parameters:\n{}",
                    kind, def.description, params
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub(crate) fn parse_toml<T: DeserializeOwned>(
    text: &str,
    what: &'static str,
) -> Result<T, RegistryError> {
    toml::from_str(text).map_err(|e| RegistryError::Parse {
        what,
        detail: e.to_string(),
    })
}

pub(crate) fn parse_json<T: DeserializeOwned>(
    text: &str,
    what: &'static str,
) -> Result<T, RegistryError> {
    serde_json::from_str(text).map_err(|e| RegistryError::Parse {
        what,
        detail: e.to_string(),
    })
}

/// 读取注册表文件：.json 按 JSON 解析，其余按 TOML
pub(crate) fn read_document<T: DeserializeOwned>(
    path: &Path,
    what: &'static str,
) -> Result<T, RegistryError> {
    let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        parse_json(&text, what)
    } else {
        parse_toml(&text, what)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_loads() {
        let registry = ActionRegistry::builtin().expect("builtin actions");
        let task = registry.get(ActionKind::CreateTask).unwrap();
        assert_eq!(task.event.as_deref(), Some("createTask"));
        assert!(task.param("step_tag").unwrap().required);
        assert_eq!(registry.kinds().len(), ActionKind::ALL.len());
    }

    #[test]
    fn test_resolve_unknown_tool() {
        let registry = ActionRegistry::builtin().unwrap();
        assert!(registry.resolve("delete_everything").is_none());
        let (kind, _) = registry.resolve("suggest_tasks").unwrap();
        assert_eq!(kind, ActionKind::SuggestTasks);
    }

    #[test]
    fn test_duplicate_param_rejected() {
        let text = r#"
[actions.create_topic]
description = "x"
[[actions.create_topic.params]]
name = "topic"
type = "string"
[[actions.create_topic.params]]
name = "topic"
type = "string"
"#;
        let err = ActionRegistry::from_toml_str(text).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateParam { .. }));
    }

    #[test]
    fn test_items_on_scalar_rejected() {
        let text = r#"
[actions.create_topic]
description = "x"
[[actions.create_topic.params]]
name = "topic"
type = "string"
items = { type = "string" }
"#;
        let err = ActionRegistry::from_toml_str(text).unwrap_err();
        assert!(matches!(err, RegistryError::ItemsOnScalar { .. }));
    }

    #[test]
    fn test_unknown_action_name_fails_at_load() {
        let text = r#"
[actions.launch_rocket]
description = "x"
"#;
        assert!(ActionRegistry::from_toml_str(text).is_err());
    }

    #[test]
    fn test_json_map_form_params() {
        let text = r#"{
          "actions": {
            "suggest_tasks": {
              "description": "建议任务",
              "params": {
                "tasks": {
                  "type": "array",
                  "required": true,
                  "description": "任务列表",
                  "items": {
                    "type": "object",
                    "properties": { "task_name": { "type": "string" }, "step_tag": { "type": "string" } }
                  }
                }
              }
            }
          }
        }"#;
        let registry = ActionRegistry::from_json_str(text).unwrap();
        let def = registry.get(ActionKind::SuggestTasks).unwrap();
        let shape = def.param("tasks").unwrap().items.as_ref().unwrap();
        let mut props = shape.required_properties();
        props.sort();
        assert_eq!(props, vec!["step_tag", "task_name"]);
    }

    #[test]
    fn test_map_form_keeps_declared_order() {
        let toml_text = r#"
[actions.create_task]
description = "建立任务"
[actions.create_task.params.task_name]
type = "string"
required = true
[actions.create_task.params.step_tag]
type = "string"
required = true
"#;
        let json_text = r#"{"actions": {"create_task": {
            "description": "建立任务",
            "params": {
                "task_name": {"type": "string", "required": true},
                "step_tag": {"type": "string", "required": true}
            }
        }}}"#;
        for registry in [
            ActionRegistry::from_toml_str(toml_text).unwrap(),
            ActionRegistry::from_json_str(json_text).unwrap(),
        ] {
            let def = registry.get(ActionKind::CreateTask).unwrap();
            let names: Vec<_> = def.params.iter().map(|p| p.name.as_str()).collect();
            assert_eq!(names, vec!["task_name", "step_tag"]);
        }
    }

    #[test]
    fn test_describe_lists_only_requested() {
        let registry = ActionRegistry::builtin().unwrap();
        let text = registry.describe(&[ActionKind::SuggestTasks]);
        assert!(text.contains("suggest_tasks"));
        assert!(text.contains("array of objects with properties: {task_name, step_tag}"));
        assert!(!text.contains("create_topic"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actions.toml");
        std::fs::write(&path, BUILTIN_ACTIONS).unwrap();
        let registry = ActionRegistry::load(&path).unwrap();
        assert!(registry.contains(ActionKind::Chat));
    }
}
