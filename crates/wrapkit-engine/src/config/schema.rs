use std::collections::HashSet;

use serde::Deserialize;
use wrapkit_core::error::{Error, Result};

use crate::memo::NotCacheablePolicy;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameworkConfig {
    pub version: u32,

    /// Defaults for every `memoize` layer.
    #[serde(default)]
    pub memoize: MemoDefaults,

    #[serde(default)]
    pub functions: Vec<FunctionConfig>,
}

impl FrameworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(Error::configuration(format!(
                "unsupported config version {} (expected 1)",
                self.version
            )));
        }

        self.memoize.validate()?;

        let mut seen = HashSet::new();
        for f in &self.functions {
            f.validate()?;
            if !seen.insert(f.name.as_str()) {
                return Err(Error::configuration(format!(
                    "function `{}` is configured more than once",
                    f.name
                )));
            }
        }
        Ok(())
    }

    /// Configuration for one function by name.
    pub fn function(&self, name: &str) -> Option<&FunctionConfig> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoDefaults {
    #[serde(default)]
    pub cache_failures: bool,

    #[serde(default)]
    pub on_not_cacheable: NotCacheablePolicy,

    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl MemoDefaults {
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == Some(0) {
            return Err(Error::configuration("memoize.max_entries must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionConfig {
    pub name: String,

    /// Outermost first, same order as `compose`.
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

impl FunctionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::configuration("functions[].name must not be empty"));
        }
        for layer in &self.layers {
            layer.validate().map_err(|e| e.context(format!("in function `{}`", self.name)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub enum LayerConfig {
    Log,
    Time,
    Memoize(MemoLayerConfig),
    RequireRole(RoleLayerConfig),
    Timeout(TimeoutLayerConfig),
}

impl LayerConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            LayerConfig::Log | LayerConfig::Time => Ok(()),
            LayerConfig::Memoize(m) => {
                if m.max_entries == Some(0) {
                    return Err(Error::configuration("memoize.max_entries must be at least 1"));
                }
                Ok(())
            }
            LayerConfig::RequireRole(r) => {
                if r.role.trim().is_empty() {
                    return Err(Error::configuration("require_role.role must not be empty"));
                }
                Ok(())
            }
            LayerConfig::Timeout(t) => {
                if !(1..=3_600_000).contains(&t.ms) {
                    return Err(Error::configuration(
                        "timeout.ms must be between 1 and 3600000",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Per-layer overrides; unset fields fall back to `FrameworkConfig::memoize`.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoLayerConfig {
    #[serde(default)]
    pub cache_failures: Option<bool>,

    #[serde(default)]
    pub on_not_cacheable: Option<NotCacheablePolicy>,

    #[serde(default)]
    pub max_entries: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RoleLayerConfig {
    pub role: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TimeoutLayerConfig {
    pub ms: u64,
}
