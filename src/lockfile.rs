// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use log::{debug, error, info};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tokio::time::{Duration, sleep};

/// Advisory mutual-exclusion file. Acquisition is an exclusive create; the
/// file holds the owner's PID for operator debugging. Release is bound to
/// Drop so it runs on every exit path.
pub struct LockFile {
    path: PathBuf,
    held: bool,
}

impl LockFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, held: false }
    }

    /// Single acquisition attempt; failure is retryable.
    pub fn try_acquire(&mut self) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .with_context(|| format!("acquiring lock file {}", self.path.display()))?;
        file.write_all(std::process::id().to_string().as_bytes())
            .with_context(|| format!("writing pid to {}", self.path.display()))?;
        self.held = true;
        info!("acquired lock file {}", self.path.display());
        Ok(())
    }

    /// Retry acquisition at a fixed interval until it succeeds. No backoff,
    /// no retry cap: whatever holds the lock is assumed to eventually
    /// release it.
    pub async fn acquire(path: PathBuf, retry_interval: Duration) -> Self {
        let mut lock = LockFile::new(path);
        loop {
            match lock.try_acquire() {
                Ok(()) => return lock,
                Err(e) => {
                    debug!("lock busy, retrying: {e:#}");
                    sleep(retry_interval).await;
                }
            }
        }
    }

    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Err(e) = std::fs::remove_file(&self.path) {
            error!("failed to remove lock file {}: {e}", self.path.display());
        } else {
            info!("released lock file {}", self.path.display());
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.release();
    }
}
