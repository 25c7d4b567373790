//! 状态注册表
//!
//! 每个状态声明：说明、默认可用工具（白名单）、事件 -> 下一状态 的转移表。
//! 加载时校验所有转移目标都是已声明的状态。

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::RegistryError;
use crate::tools::registry::{parse_json, parse_toml, read_document};
use crate::tools::{ActionKind, ActionRegistry};

const BUILTIN_STATES: &str = include_str!("../../config/states.toml");

/// 单个状态的配置（加载后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(skip_deserializing)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "defaultTools")]
    pub default_tools: Vec<ActionKind>,
    #[serde(default)]
    pub transitions: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StatesFile {
    states: BTreeMap<String, StateConfig>,
}

/// 状态注册表
#[derive(Debug, Clone)]
pub struct StateRegistry {
    states: BTreeMap<String, StateConfig>,
}

impl StateRegistry {
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_toml_str(BUILTIN_STATES)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, RegistryError> {
        let file: StatesFile = parse_toml(text, "state registry")?;
        Self::new(file.states)
    }

    pub fn from_json_str(text: &str) -> Result<Self, RegistryError> {
        let file: StatesFile = parse_json(text, "state registry")?;
        Self::new(file.states)
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let file: StatesFile = read_document(path, "state registry")?;
        Self::new(file.states)
    }

    pub fn new(mut states: BTreeMap<String, StateConfig>) -> Result<Self, RegistryError> {
        if states.is_empty() {
            return Err(RegistryError::Empty { what: "state" });
        }
        for (name, state) in &states {
            for (event, target) in &state.transitions {
                if !states.contains_key(target) {
                    return Err(RegistryError::UnknownTarget {
                        state: name.clone(),
                        event: event.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        for (name, state) in states.iter_mut() {
            state.name = name.clone();
        }
        Ok(Self { states })
    }

    /// 交叉校验：每个状态的默认工具都必须在动作注册表中
    pub fn check_tools(&self, actions: &ActionRegistry) -> Result<(), RegistryError> {
        for (name, state) in &self.states {
            if let Some(tool) = state.default_tools.iter().find(|t| !actions.contains(**t)) {
                return Err(RegistryError::UnknownTool {
                    state: name.clone(),
                    tool: tool.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&StateConfig> {
        self.states.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }
}
