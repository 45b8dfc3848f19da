// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::config::{ConfigFormat, EnvSource};
use crate::options::{Options, SupervisorMode, parse_env_pairs, parse_signal_name};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::time::Duration;

const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(2);

/// Run a single command under supervision
#[derive(Parser, Debug)]
#[command(name = "dd-supervise")]
#[command(about = "Run one command, stop it gracefully on signals, restart it when watched configuration changes")]
pub struct Args {
    /// Format of the configuration the child environment is read from
    #[arg(short = 'f', long, value_enum, default_value = "none")]
    pub config_format: ConfigFormat,

    /// Path to the configuration file (or directory for env-dir)
    #[arg(short = 'c', long)]
    pub config_path: Option<PathBuf>,

    /// Extra KEY=VALUE environment entries for the child; override the config
    #[arg(short = 'e', long = "env")]
    pub envs: Vec<String>,

    /// Signal sent first when stopping, by name (with or without SIG prefix)
    #[arg(short = 's', long, default_value = "SIGTERM")]
    pub signal: String,

    /// Seconds to wait after the graceful signal before escalating to SIGKILL
    #[arg(short = 'g', long, default_value_t = 5.0)]
    pub graceful_timeout: f64,

    /// Allocate a pseudo-terminal for the child
    #[arg(long)]
    pub pty: bool,

    /// Supervise the command, ignoring watched-path changes
    #[arg(long)]
    pub supervise: bool,

    /// Supervise the command and restart it when a watched path changes
    #[arg(short = 'r', long)]
    pub restart_on_change: bool,

    /// Serialize runs through this lock file
    #[arg(short = 'l', long)]
    pub lock_file: Option<PathBuf>,

    /// Additional paths whose changes also trigger a restart
    #[arg(short = 't', long = "track")]
    pub tracked_paths: Vec<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Command to execute, placed after `--`
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

impl Args {
    pub fn into_options(self) -> Result<Options> {
        let mode = if self.restart_on_change {
            SupervisorMode::Restarting
        } else if self.supervise {
            SupervisorMode::Simple
        } else {
            SupervisorMode::None
        };
        Ok(Options {
            command: self.command,
            signal: parse_signal_name(&self.signal)?,
            graceful_timeout: Duration::try_from_secs_f64(self.graceful_timeout)
                .with_context(|| format!("invalid graceful timeout: {}", self.graceful_timeout))?,
            check_interval: DEFAULT_CHECK_INTERVAL,
            pty: self.pty,
            mode,
            lock_file: self.lock_file,
            tracked_paths: self.tracked_paths,
            env_source: EnvSource {
                format: self.config_format,
                path: self.config_path,
                overrides: parse_env_pairs(&self.envs),
            },
        })
    }
}
