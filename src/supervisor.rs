// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::config::EnvSource;
use crate::options::{Options, SupervisorMode};
use crate::process::ManagedProcess;
use anyhow::Result;
use log::{debug, info, warn};
use nix::sys::signal::Signal;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, interval};

/// A request produced by a bridge and consumed by the supervisor. Ordering
/// between actions matters, identity does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorAction {
    Stop,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorState {
    Idle,
    Running,
    /// Graceful termination in progress; ends in `Terminated`.
    Stopping,
    /// Graceful termination of the current process, then a fresh start.
    Restarting,
    Terminated,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Idle => write!(f, "idle"),
            SupervisorState::Running => write!(f, "running"),
            SupervisorState::Stopping => write!(f, "stopping"),
            SupervisorState::Restarting => write!(f, "restarting"),
            SupervisorState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Owns the current [`ManagedProcess`] and applies stop/restart actions to
/// it. All mutation goes through the drain loop, which is never entered
/// concurrently; the state machine needs no locking.
pub struct Supervisor {
    command: Vec<String>,
    signal: Signal,
    graceful_timeout: Duration,
    check_interval: Duration,
    pty: bool,
    restart_enabled: bool,
    env_source: EnvSource,
    envs: HashMap<String, String>,
    state: SupervisorState,
    process: Option<ManagedProcess>,
    exit_code_tx: Option<oneshot::Sender<i32>>,
}

impl Supervisor {
    pub fn new(options: &Options, exit_code_tx: oneshot::Sender<i32>) -> Self {
        Self {
            command: options.command.clone(),
            signal: options.signal,
            graceful_timeout: options.graceful_timeout,
            check_interval: options.check_interval,
            pty: options.pty,
            restart_enabled: options.mode == SupervisorMode::Restarting,
            env_source: options.env_source.clone(),
            envs: HashMap::new(),
            state: SupervisorState::Idle,
            process: None,
            exit_code_tx: Some(exit_code_tx),
        }
    }

    /// Resolve the environment and start the initial process.
    pub fn start(&mut self) -> Result<()> {
        self.envs = self.env_source.resolve()?;
        self.process = Some(self.spawn_process());
        self.state = SupervisorState::Running;
        Ok(())
    }

    fn spawn_process(&self) -> ManagedProcess {
        let mut process = ManagedProcess::new(
            self.command.clone(),
            self.envs.clone(),
            self.pty,
            self.check_interval,
        );
        process.start();
        process
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid())
    }

    /// Drain the merged action stream, applying each action sequentially.
    /// A tick arm detects the child exiting on its own. Runs until the
    /// supervisor terminates or every producer has gone away.
    pub async fn run(mut self, mut rx: mpsc::Receiver<SupervisorAction>) {
        let mut tick = interval(self.check_interval);
        loop {
            tokio::select! {
                action = rx.recv() => match action {
                    Some(action) => {
                        let action = sweep_stop_wins(action, &mut rx);
                        self.apply(action).await;
                    }
                    None => break,
                },
                _ = tick.tick() => self.check_natural_exit(),
            }
            if self.state == SupervisorState::Terminated {
                break;
            }
        }
    }

    /// The single mutation entry point; callers must never invoke it
    /// concurrently with itself.
    async fn apply(&mut self, action: SupervisorAction) {
        if self.state == SupervisorState::Terminated {
            debug!("ignoring {action:?}: supervisor already terminated");
            return;
        }
        match action {
            SupervisorAction::Stop => self.handle_stop().await,
            SupervisorAction::Restart => self.handle_restart().await,
        }
    }

    async fn handle_stop(&mut self) {
        info!("stopping supervised process");
        self.state = SupervisorState::Stopping;
        let code = match self.process.as_mut() {
            Some(process) => {
                process.stop(self.signal, self.graceful_timeout).await;
                process.exit_code()
            }
            None => crate::process::UNKNOWN_EXIT_CODE,
        };
        self.process = None;
        self.publish(code);
    }

    async fn handle_restart(&mut self) {
        if !self.restart_enabled {
            debug!("ignoring restart: supervisor mode disables it");
            return;
        }
        if self.state != SupervisorState::Running {
            debug!("ignoring restart in state {}", self.state);
            return;
        }
        info!("restarting supervised process");
        self.state = SupervisorState::Restarting;
        if let Some(mut process) = self.process.take() {
            process.stop(self.signal, self.graceful_timeout).await;
        }
        match self.env_source.resolve() {
            Ok(envs) => self.envs = envs,
            Err(e) => warn!("keeping previous environment, reload failed: {e:#}"),
        }
        self.process = Some(self.spawn_process());
        self.state = SupervisorState::Running;
    }

    /// A process that exits on its own (not via a supervisor-initiated stop)
    /// terminates the run with its natural exit code.
    fn check_natural_exit(&mut self) {
        if self.state != SupervisorState::Running {
            return;
        }
        let Some(process) = self.process.as_mut() else {
            return;
        };
        if process.stopped() {
            let code = process.exit_code();
            info!("supervised process exited on its own with code {code}");
            self.process = None;
            self.publish(code);
        }
    }

    /// One-slot rendezvous: the sender is consumed on the first publish, so
    /// exactly one exit code is ever emitted per run.
    fn publish(&mut self, code: i32) {
        if let Some(tx) = self.exit_code_tx.take() {
            let _ = tx.send(code);
        }
        self.state = SupervisorState::Terminated;
    }
}

/// STOP always wins: a restart is a convenience, a stop is an authoritative
/// shutdown request. Before acting on a restart, sweep the queue; any
/// pending stop preempts it, and back-to-back restarts coalesce into one.
fn sweep_stop_wins(
    action: SupervisorAction,
    rx: &mut mpsc::Receiver<SupervisorAction>,
) -> SupervisorAction {
    if action == SupervisorAction::Stop {
        return action;
    }
    while let Ok(pending) = rx.try_recv() {
        if pending == SupervisorAction::Stop {
            return SupervisorAction::Stop;
        }
    }
    SupervisorAction::Restart
}
