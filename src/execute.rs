// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::bridge::{SignalSubscription, restart_bridge, signal_bridge};
use crate::lockfile::LockFile;
use crate::options::{Options, SupervisorMode};
use crate::supervisor::{Supervisor, SupervisorAction};
use crate::watcher::ChangeWatcher;
use anyhow::{Context, Result};
use log::info;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(250);
const ACTION_CHANNEL_CAPACITY: usize = 16;

/// Wire up one supervised run: lock, watcher, bridges, supervisor, drain
/// loop. Blocks until exactly one exit code comes out of the rendezvous,
/// then tears every producer down. Startup failures return before the drain
/// loop ever starts.
pub async fn execute(options: &Options) -> Result<i32> {
    let _lock = match &options.lock_file {
        Some(path) => {
            info!("acquiring lock file {}", path.display());
            Some(LockFile::acquire(path.clone(), LOCK_RETRY_INTERVAL).await)
        }
        None => None,
    };

    let (action_tx, action_rx) = mpsc::channel(ACTION_CHANNEL_CAPACITY);
    let mut producers: Vec<JoinHandle<()>> = Vec::new();

    let result = start_run(options, &action_tx, &mut producers, action_rx).await;
    for task in &producers {
        task.abort();
    }
    // The lock guard drops here on every path.
    result
}

async fn start_run(
    options: &Options,
    action_tx: &mpsc::Sender<SupervisorAction>,
    producers: &mut Vec<JoinHandle<()>>,
    action_rx: mpsc::Receiver<SupervisorAction>,
) -> Result<i32> {
    let subscription = SignalSubscription::new()?;
    producers.push(tokio::spawn(signal_bridge(subscription, action_tx.clone())));

    // Only restarting mode consumes change pulses; the other modes leave the
    // watcher unstarted.
    let mut _watcher = None;
    if options.mode == SupervisorMode::Restarting {
        let paths = options.watched_paths();
        let (watcher, pulses) = ChangeWatcher::start(&paths)?;
        _watcher = Some(watcher);
        producers.push(tokio::spawn(restart_bridge(pulses, action_tx.clone())));
    }

    let (code_tx, code_rx) = oneshot::channel();
    let mut supervisor = Supervisor::new(options, code_tx);
    supervisor.start()?;
    info!("supervisor started (mode {})", options.mode);

    let drain = tokio::spawn(supervisor.run(action_rx));
    let code = code_rx
        .await
        .context("supervisor ended without producing an exit code")?;
    let _ = drain.await;
    Ok(code)
}
