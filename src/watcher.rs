// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Watches the configuration source plus tracked paths and collapses every
/// filesystem change into a unit pulse. The handle owns the OS watcher;
/// dropping it closes the pulse stream.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
}

impl ChangeWatcher {
    pub fn start(paths: &[PathBuf]) -> Result<(Self, mpsc::Receiver<()>)> {
        let (tx, rx) = mpsc::channel(8);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if event.kind.is_access() {
                        return;
                    }
                    debug!("filesystem event: {event:?}");
                    // A full channel already carries a pending pulse; pulses
                    // are coalescable, dropping this one loses nothing.
                    let _ = tx.try_send(());
                }
                Err(e) => warn!("watch error: {e}"),
            }
        })
        .context("creating filesystem watcher")?;

        let mut watched = 0;
        for path in paths {
            match watcher.watch(path, RecursiveMode::NonRecursive) {
                Ok(()) => watched += 1,
                Err(e) => warn!("cannot watch {}: {e}", path.display()),
            }
        }
        if watched == 0 && !paths.is_empty() {
            bail!("none of the {} requested paths could be watched", paths.len());
        }

        Ok((Self { _watcher: watcher }, rx))
    }
}
