//! 选项描述（ActionForm）
//!
//! 把 LLM 建议的参数映射成 UI 可点选的选项：`options` 从某个参数取值（数组则一项一个选项），
//! `additional_options` 是固定文字选项。使用者点选后得到一个 `ActionCall`，交给执行器。

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::RegistryError;
use crate::tools::registry::{parse_json, parse_toml, read_document};
use crate::tools::{ActionCall, ActionKind, ActionRegistry};

const BUILTIN_FORMS: &str = include_str!("../../config/forms.toml");

/// 对象元素用作标签时依次尝试的字段
const LABEL_FIELDS: [&str; 4] = ["task_name", "step_name", "title", "name"];

/// 从参数取值生成选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSource {
    pub param_source: String,
    pub param_action: ActionKind,
    /// 字符串值包装成 `{param_name: value}`；缺省时对象值原样作为参数
    #[serde(default)]
    pub param_name: Option<String>,
    /// 从回复参数原样带入选项参数的同级字段（如 create_task 的 step_tag）
    #[serde(default)]
    pub carry: Vec<String>,
}

/// 固定文字选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalOption {
    pub text: String,
    pub action: ActionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormConfig {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "showInput")]
    pub show_input: bool,
    #[serde(default)]
    pub options: Vec<OptionSource>,
    #[serde(default, alias = "additionalOptions")]
    pub additional_options: Vec<AdditionalOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormOption {
    pub label: String,
    pub action: OptionAction,
}

impl FormOption {
    /// 使用者点选后要执行的动作
    pub fn to_call(&self) -> ActionCall {
        let params = match &self.action.params {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        ActionCall {
            kind: self.action.kind,
            params,
        }
    }
}

/// 交给 UI 渲染的选项描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionForm {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub show_input: bool,
    pub options: Vec<FormOption>,
}

#[derive(Debug, Deserialize)]
struct FormsFile {
    #[serde(default)]
    forms: BTreeMap<String, FormConfig>,
}

impl FormsFile {
    fn into_typed(self) -> Result<BTreeMap<ActionKind, FormConfig>, RegistryError> {
        self.forms
            .into_iter()
            .map(|(name, form)| {
                let kind = name.parse::<ActionKind>().map_err(|detail| RegistryError::Parse {
                    what: "form registry",
                    detail,
                })?;
                Ok((kind, form))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormRegistry {
    forms: BTreeMap<ActionKind, FormConfig>,
}

impl FormRegistry {
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_toml_str(BUILTIN_FORMS)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, RegistryError> {
        let file: FormsFile = parse_toml(text, "form registry")?;
        Ok(Self::new(file.into_typed()?))
    }

    pub fn from_json_str(text: &str) -> Result<Self, RegistryError> {
        let file: FormsFile = parse_json(text, "form registry")?;
        Ok(Self::new(file.into_typed()?))
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let file: FormsFile = read_document(path, "form registry")?;
        Ok(Self::new(file.into_typed()?))
    }

    pub fn new(forms: BTreeMap<ActionKind, FormConfig>) -> Self {
        Self { forms }
    }

    pub fn get(&self, kind: ActionKind) -> Option<&FormConfig> {
        self.forms.get(&kind)
    }

    /// 交叉校验：来源参数必须是该动作声明的参数，选项动作必须已注册
    pub fn check(&self, actions: &ActionRegistry) -> Result<(), RegistryError> {
        for (kind, form) in &self.forms {
            let invalid = |detail: String| RegistryError::InvalidForm {
                form: kind.to_string(),
                detail,
            };
            let def = actions
                .get(*kind)
                .ok_or_else(|| invalid("action is not registered".to_string()))?;
            for opt in &form.options {
                if def.param(&opt.param_source).is_none() {
                    return Err(invalid(format!(
                        "param_source {} is not a parameter of {}",
                        opt.param_source, kind
                    )));
                }
                if let Some(name) = opt.carry.iter().find(|c| def.param(c).is_none()) {
                    return Err(invalid(format!("carry {name} is not a parameter of {kind}")));
                }
                if !actions.contains(opt.param_action) {
                    return Err(invalid(format!(
                        "param_action {} is not registered",
                        opt.param_action
                    )));
                }
            }
            if let Some(extra) = form
                .additional_options
                .iter()
                .find(|o| !actions.contains(o.action))
            {
                return Err(invalid(format!("action {} is not registered", extra.action)));
            }
        }
        Ok(())
    }

    /// 依据已校验的参数生成选项描述；该动作没有表单配置时返回 None
    pub fn build(&self, kind: ActionKind, params: &Map<String, Value>) -> Option<ActionForm> {
        let config = self.forms.get(&kind)?;
        let mut options = Vec::new();

        for source in &config.options {
            let values = match params.get(&source.param_source) {
                None | Some(Value::Null) => continue,
                Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
                Some(value) => vec![value],
            };
            options.extend(
                values
                    .into_iter()
                    .filter_map(|v| option_from_value(source, v, params)),
            );
        }

        options.extend(config.additional_options.iter().map(|extra| FormOption {
            label: extra.text.clone(),
            action: OptionAction {
                kind: extra.action,
                params: Value::Object(Map::from_iter([(
                    "text".to_string(),
                    Value::String(extra.text.clone()),
                )])),
            },
        }));

        Some(ActionForm {
            kind,
            title: config.title.clone(),
            description: config.description.clone(),
            show_input: config.show_input,
            options,
        })
    }
}

fn option_from_value(
    source: &OptionSource,
    value: &Value,
    response: &Map<String, Value>,
) -> Option<FormOption> {
    match value {
        Value::String(text) => {
            let params = match &source.param_name {
                Some(name) => {
                    let mut map = Map::from_iter([(name.clone(), value.clone())]);
                    for key in &source.carry {
                        if let Some(v) = response.get(key) {
                            map.insert(key.clone(), v.clone());
                        }
                    }
                    Value::Object(map)
                }
                None => value.clone(),
            };
            Some(FormOption {
                label: text.clone(),
                action: OptionAction {
                    kind: source.param_action,
                    params,
                },
            })
        }
        Value::Object(obj) => {
            let label = LABEL_FIELDS
                .iter()
                .find_map(|f| obj.get(*f).and_then(Value::as_str))
                .map(String::from)
                .unwrap_or_else(|| value.to_string());
            Some(FormOption {
                label,
                action: OptionAction {
                    kind: source.param_action,
                    params: value.clone(),
                },
            })
        }
        other => {
            tracing::debug!(
                value = %other,
                source = %source.param_source,
                "skip non-string option value"
            );
            None
        }
    }
}
