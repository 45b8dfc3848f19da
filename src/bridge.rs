// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::supervisor::SupervisorAction;
use anyhow::{Context, Result};
use log::debug;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;

/// Explicitly owned subscription to the termination-class OS signals.
/// Constructed per run and handed to the signal bridge; nothing here is a
/// module-level singleton.
pub struct SignalSubscription {
    sigterm: Signal,
    sigint: Signal,
    sigquit: Signal,
}

impl SignalSubscription {
    pub fn new() -> Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate()).context("subscribing to SIGTERM")?,
            sigint: signal(SignalKind::interrupt()).context("subscribing to SIGINT")?,
            sigquit: signal(SignalKind::quit()).context("subscribing to SIGQUIT")?,
        })
    }

    async fn recv(&mut self) -> Option<&'static str> {
        tokio::select! {
            r = self.sigterm.recv() => r.map(|_| "SIGTERM"),
            r = self.sigint.recv() => r.map(|_| "SIGINT"),
            r = self.sigquit.recv() => r.map(|_| "SIGQUIT"),
        }
    }
}

/// Forward every delivered termination signal as a stop request. Ends
/// quietly when either side closes.
pub async fn signal_bridge(mut subscription: SignalSubscription, tx: mpsc::Sender<SupervisorAction>) {
    while let Some(name) = subscription.recv().await {
        debug!("received {name} from OS");
        if tx.send(SupervisorAction::Stop).await.is_err() {
            return;
        }
    }
}

/// Forward every watcher pulse as a restart request. Only spawned when
/// restart-on-change mode is enabled.
pub async fn restart_bridge(mut pulses: mpsc::Receiver<()>, tx: mpsc::Sender<SupervisorAction>) {
    while pulses.recv().await.is_some() {
        debug!("change pulse captured");
        if tx.send(SupervisorAction::Restart).await.is_err() {
            return;
        }
    }
}
