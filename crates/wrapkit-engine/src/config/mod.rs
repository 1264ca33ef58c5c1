//! Framework config loader (strict parsing).

pub mod schema;

use std::fs;

use wrapkit_core::error::{Error, Result};

pub use schema::{
    FrameworkConfig, FunctionConfig, LayerConfig, MemoDefaults, MemoLayerConfig, RoleLayerConfig,
    TimeoutLayerConfig,
};

/// Read, parse and validate a YAML config file.
pub fn load_from_file(path: &str) -> Result<FrameworkConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| Error::configuration(format!("read config `{path}` failed: {e}")))?;
    load_from_str(&s)
}

/// Parse and validate YAML config text.
pub fn load_from_str(s: &str) -> Result<FrameworkConfig> {
    let cfg: FrameworkConfig = serde_yaml::from_str(s)
        .map_err(|e| Error::configuration(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
