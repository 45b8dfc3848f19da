// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use log::warn;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Source format of the configuration the child's environment is read from.
/// Whatever the format, the result is one flat string-to-string map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    None,
    Json,
    Yaml,
    Ini,
    EnvDir,
}

/// Where the child environment comes from: an optional config file/directory
/// plus `--env` overrides. Overrides always win. Re-resolved on each restart
/// so edits take effect.
#[derive(Debug, Clone)]
pub struct EnvSource {
    pub format: ConfigFormat,
    pub path: Option<PathBuf>,
    pub overrides: HashMap<String, String>,
}

impl EnvSource {
    pub fn resolve(&self) -> Result<HashMap<String, String>> {
        let mut envs = match &self.path {
            Some(path) if self.format != ConfigFormat::None => resolve(self.format, path)?,
            _ => HashMap::new(),
        };
        envs.extend(self.overrides.clone());
        Ok(envs)
    }
}

/// Parse the configuration at `path` into a flat map. Malformed content is a
/// hard error; the caller decides whether that aborts startup or keeps the
/// previous map.
pub fn resolve(format: ConfigFormat, path: &Path) -> Result<HashMap<String, String>> {
    match format {
        ConfigFormat::None => Ok(HashMap::new()),
        ConfigFormat::Json => parse_json(path),
        ConfigFormat::Yaml => parse_yaml(path),
        ConfigFormat::Ini => parse_ini(path),
        ConfigFormat::EnvDir => parse_env_dir(path),
    }
}

fn parse_json(path: &Path) -> Result<HashMap<String, String>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    let Some(object) = value.as_object() else {
        bail!("incorrect content in {}: expected a top-level object", path.display());
    };
    let mut envs = HashMap::new();
    for (key, value) in object {
        let Some(s) = value.as_str() else {
            bail!("cannot convert value of {key} in {} to string", path.display());
        };
        envs.insert(key.clone(), s.to_string());
    }
    Ok(envs)
}

fn parse_yaml(path: &Path) -> Result<HashMap<String, String>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    let Some(mapping) = value.as_mapping() else {
        bail!("incorrect content in {}: expected a top-level mapping", path.display());
    };
    let mut envs = HashMap::new();
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            bail!("non-string key in {}", path.display());
        };
        let Some(s) = value.as_str() else {
            bail!("cannot convert value of {key} in {} to string", path.display());
        };
        envs.insert(key.to_string(), s.to_string());
    }
    Ok(envs)
}

/// All sections are flattened into one map; section names are discarded.
/// Supports `key=value`, quoted values, comments (# and ;) and blank lines.
fn parse_ini(path: &Path) -> Result<HashMap<String, String>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut envs = HashMap::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            continue;
        }
        if let Some((key, raw_val)) = trimmed.split_once('=') {
            let val = raw_val
                .trim()
                .trim_matches('"')
                .trim_matches('\'')
                .to_string();
            envs.insert(key.trim().to_string(), val);
        }
    }
    Ok(envs)
}

/// One file per key: the filename is the key and the trimmed file content is
/// the value. Subdirectories are skipped; an unreadable entry is skipped with
/// a warning, the remaining entries are still processed.
fn parse_env_dir(path: &Path) -> Result<HashMap<String, String>> {
    let entries = std::fs::read_dir(path)
        .with_context(|| format!("reading directory {}", path.display()))?;
    let mut envs = HashMap::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry in {}: {e}", path.display());
                continue;
            }
        };
        if entry.path().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(String::from) else {
            warn!("skipping non-utf8 filename in {}", path.display());
            continue;
        };
        match std::fs::read_to_string(entry.path()) {
            Ok(contents) => {
                envs.insert(name, contents.trim().to_string());
            }
            Err(e) => warn!("skipping {}: {e}", entry.path().display()),
        }
    }
    Ok(envs)
}
