// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::config::EnvSource;
use anyhow::{Context, Result};
use nix::sys::signal::Signal;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::time::Duration;

/// Policy governing whether file-change events trigger a restart. A closed
/// enumeration compared by exact value: only `Restarting` attaches the
/// restart bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorMode {
    /// File changes are ignored; signals still stop the run.
    None,
    /// Supervised, but file changes are ignored.
    Simple,
    /// File changes restart the child.
    Restarting,
}

impl fmt::Display for SupervisorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorMode::None => write!(f, "none"),
            SupervisorMode::Simple => write!(f, "simple"),
            SupervisorMode::Restarting => write!(f, "restarting"),
        }
    }
}

/// Resolved options for one run.
#[derive(Debug)]
pub struct Options {
    pub command: Vec<String>,
    pub signal: Signal,
    pub graceful_timeout: Duration,
    /// Poll tick used by the graceful-stop loop and the natural-exit check.
    pub check_interval: Duration,
    pub pty: bool,
    pub mode: SupervisorMode,
    pub lock_file: Option<PathBuf>,
    pub tracked_paths: Vec<PathBuf>,
    pub env_source: EnvSource,
}

impl Options {
    /// The configuration source plus any tracked paths; immutable for the
    /// duration of a run.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(config_path) = &self.env_source.path {
            paths.push(config_path.clone());
        }
        paths.extend(self.tracked_paths.iter().cloned());
        paths
    }
}

/// Parse a signal name case-insensitively, with or without the `SIG` prefix:
/// "term", "TERM", "sigterm" and "SIGTERM" all map to SIGTERM.
pub fn parse_signal_name(name: &str) -> Result<Signal> {
    let upper = name.to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&full).with_context(|| format!("unknown signal name: {name}"))
}

/// Parse `K=V` pairs; a bare `K` means an empty value, the value keeps any
/// further `=` characters. Later pairs win.
pub fn parse_env_pairs(pairs: &[String]) -> HashMap<String, String> {
    let mut envs = HashMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) => envs.insert(key.to_string(), value.to_string()),
            None => envs.insert(pair.clone(), String::new()),
        };
    }
    envs
}
