// src/exec/env.rs

//! Step environment assembly.
//!
//! Order of precedence (later wins): `envfile`, inline `env`, then the
//! `CALX_*` variables added by the command builders.

use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::config::model::StepConfig;
use crate::errors::{CalxError, Result};

/// Parse a `KEY=VALUE` env file.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is allowed,
/// and values wrapped in matching single or double quotes are unquoted.
pub fn parse_envfile(contents: &str) -> Result<Vec<(String, String)>> {
    let mut vars = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let (key, value) = line.split_once('=').ok_or_else(|| {
            CalxError::ConfigError(format!("envfile line {}: expected KEY=VALUE", idx + 1))
        })?;

        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(CalxError::ConfigError(format!(
                "envfile line {}: invalid variable name '{}'",
                idx + 1,
                key
            )));
        }

        vars.push((key.to_string(), unquote(value.trim()).to_string()));
    }

    Ok(vars)
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Read and parse an env file.
pub fn read_envfile(path: &Path) -> Result<Vec<(String, String)>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading envfile {:?}", path))?;
    parse_envfile(&contents)
}

/// User-declared environment of a step: `envfile` (relative to `workdir`)
/// followed by inline `env`.
pub fn step_environment(workdir: &Path, config: &StepConfig) -> Result<Vec<(String, String)>> {
    let mut vars = match config.envfile {
        Some(ref file) => read_envfile(&workdir.join(file))?,
        None => Vec::new(),
    };

    vars.extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(vars)
}
