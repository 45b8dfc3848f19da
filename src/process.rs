// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result, bail};
use log::{error, info, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tokio::time::{Duration, Instant, interval};

/// Sentinel returned by `exit_code` while the child is still running.
pub const STILL_RUNNING: i32 = -1;
/// Exit code reported for a child terminated by a signal.
pub const INTERRUPT_EXIT_CODE: i32 = 130;
/// Exit code reported when the wait status cannot be decoded or the spawn failed.
pub const UNKNOWN_EXIT_CODE: i32 = 70;

/// One supervised OS child process. Exclusively owned by the supervisor;
/// never reused once its exit code has been harvested.
pub struct ManagedProcess {
    command: Vec<String>,
    envs: HashMap<String, String>,
    pty: bool,
    check_interval: Duration,
    child: Option<Child>,
    status: Option<ExitStatus>,
    spawn_failed: bool,
}

impl ManagedProcess {
    pub fn new(
        command: Vec<String>,
        envs: HashMap<String, String>,
        pty: bool,
        check_interval: Duration,
    ) -> Self {
        Self {
            command,
            envs,
            pty,
            check_interval,
            child: None,
            status: None,
            spawn_failed: false,
        }
    }

    /// Launch the command. Never fails synchronously: a spawn error is
    /// recorded and surfaced through `stopped`/`exit_code` instead, since the
    /// caller does not block on the launch.
    pub fn start(&mut self) {
        match self.spawn_command() {
            Ok(child) => {
                info!(
                    "spawned (pid={}, cmd={:?})",
                    child.id().unwrap_or(0),
                    self.command
                );
                self.child = Some(child);
            }
            Err(e) => {
                error!("failed to spawn {:?}: {e:#}", self.command);
                self.spawn_failed = true;
            }
        }
    }

    fn spawn_command(&self) -> Result<Child> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("empty command line");
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        if self.pty {
            attach_pty(&mut cmd).context("allocating pty")?;
        }
        cmd.spawn()
            .with_context(|| format!("spawning {program}"))
    }

    /// True once the child has exited (or never managed to start).
    pub fn stopped(&mut self) -> bool {
        if self.spawn_failed || self.status.is_some() {
            return true;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                info!("child exited with {status}");
                self.status = Some(status);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("failed to poll child status: {e}");
                false
            }
        }
    }

    /// Decode the wait status into a conventional exit code. Stable across
    /// repeated calls once the child has stopped.
    pub fn exit_code(&mut self) -> i32 {
        if !self.stopped() {
            warn!("child is still running");
            return STILL_RUNNING;
        }
        let Some(status) = self.status else {
            // spawn_failed: there is no wait status to decode.
            return UNKNOWN_EXIT_CODE;
        };
        if let Some(code) = status.code() {
            code
        } else if status.signal().is_some() {
            INTERRUPT_EXIT_CODE
        } else {
            error!("cannot decode wait status {status:?}");
            UNKNOWN_EXIT_CODE
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    fn send_signal(&self, sig: Signal) {
        if let Some(pid) = self.pid() {
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), sig) {
                warn!("failed to send {sig} to pid {pid}: {e}");
            }
        }
    }

    /// Graceful termination: send `sig`, poll at the check interval, escalate
    /// to a single SIGKILL once `timeout` elapses, keep polling until the
    /// child is reaped. Idempotent; blocks the caller until termination is
    /// observed.
    pub async fn stop(&mut self, sig: Signal, timeout: Duration) {
        if self.stopped() {
            return;
        }

        self.send_signal(sig);

        let deadline = Instant::now() + timeout;
        let mut tick = interval(self.check_interval);
        let mut kill_sent = false;
        loop {
            tick.tick().await;
            if self.stopped() {
                return;
            }
            if !kill_sent && Instant::now() >= deadline {
                info!("graceful timeout expired, sending SIGKILL");
                self.send_signal(Signal::SIGKILL);
                kill_sent = true;
            }
        }
    }
}

/// Wire a fresh pty slave to the child's stdio and pump the master side to
/// our stdout from a plain thread. The pump ends with EIO once the child
/// closes the slave end.
fn attach_pty(cmd: &mut Command) -> Result<()> {
    let pty = nix::pty::openpty(
        None::<&nix::pty::Winsize>,
        None::<&nix::sys::termios::Termios>,
    )
    .context("openpty")?;
    cmd.stdin(Stdio::from(pty.slave.try_clone().context("dup pty slave")?));
    cmd.stdout(Stdio::from(pty.slave.try_clone().context("dup pty slave")?));
    cmd.stderr(Stdio::from(pty.slave));

    // The child must lead its own session with the slave as controlling
    // terminal, or line-disciplined programs will not see a real tty. The
    // slave is already dup'd onto fd 0 when this runs in the forked child.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()?;
            if nix::libc::ioctl(0, nix::libc::TIOCSCTTY as _, 0) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut master = std::fs::File::from(pty.master);
    std::thread::spawn(move || {
        let _ = std::io::copy(&mut master, &mut std::io::stdout());
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(2);

    fn proc_of(argv: &[&str]) -> ManagedProcess {
        ManagedProcess::new(
            argv.iter().map(|s| s.to_string()).collect(),
            HashMap::new(),
            false,
            TICK,
        )
    }

    async fn wait_stopped(p: &mut ManagedProcess) {
        let mut tick = interval(TICK);
        while !p.stopped() {
            tick.tick().await;
        }
    }

    #[tokio::test]
    async fn test_exit_code_passthrough() {
        let mut p = proc_of(&["/bin/sh", "-c", "exit 7"]);
        p.start();
        wait_stopped(&mut p).await;
        assert_eq!(p.exit_code(), 7);
    }

    #[tokio::test]
    async fn test_exit_code_zero() {
        let mut p = proc_of(&["/bin/true"]);
        p.start();
        wait_stopped(&mut p).await;
        assert_eq!(p.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_still_running_sentinel() {
        let mut p = proc_of(&["/bin/sleep", "60"]);
        p.start();
        assert_eq!(p.exit_code(), STILL_RUNNING);
        p.stop(Signal::SIGKILL, Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_signal_termination_maps_to_130() {
        let mut p = proc_of(&["/bin/sleep", "60"]);
        p.start();
        p.stop(Signal::SIGTERM, Duration::from_secs(5)).await;
        assert_eq!(p.exit_code(), INTERRUPT_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_sigkill_escalation_after_timeout() {
        let mut p = proc_of(&["/bin/sh", "-c", "trap '' TERM; sleep 60"]);
        p.start();
        // Give the shell a moment to install the trap.
        tokio::time::sleep(Duration::from_millis(100)).await;
        p.stop(Signal::SIGTERM, Duration::from_millis(50)).await;
        assert!(p.stopped());
        assert_eq!(p.exit_code(), INTERRUPT_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_stop_already_stopped_is_noop() {
        let mut p = proc_of(&["/bin/true"]);
        p.start();
        wait_stopped(&mut p).await;
        // Must return immediately without sending anything.
        p.stop(Signal::SIGTERM, Duration::from_secs(60)).await;
        assert_eq!(p.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces_as_unknown() {
        let mut p = proc_of(&["/nonexistent/binary"]);
        p.start();
        assert!(p.stopped());
        assert_eq!(p.exit_code(), UNKNOWN_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_empty_command_surfaces_as_unknown() {
        let mut p = proc_of(&[]);
        p.start();
        assert!(p.stopped());
        assert_eq!(p.exit_code(), UNKNOWN_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_stopped_and_exit_code_idempotent() {
        let mut p = proc_of(&["/bin/sh", "-c", "exit 3"]);
        p.start();
        wait_stopped(&mut p).await;
        for _ in 0..3 {
            assert!(p.stopped());
            assert_eq!(p.exit_code(), 3);
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_pty_child_controls_its_terminal() {
        // Session id and controlling tty are fields 6 and 7 of /proc/pid/stat;
        // the child must be its own session leader with a nonzero tty.
        let mut p = ManagedProcess::new(
            vec![
                "/bin/sh".into(),
                "-c".into(),
                "read _ _ _ _ _ sid tty _ < /proc/$$/stat; \
                 [ \"$sid\" = \"$$\" ] && [ \"$tty\" != 0 ]"
                    .into(),
            ],
            HashMap::new(),
            true,
            TICK,
        );
        p.start();
        wait_stopped(&mut p).await;
        assert_eq!(p.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_child_env() {
        let mut envs = HashMap::new();
        envs.insert("MY_EXIT_CODE".to_string(), "42".to_string());
        let mut p = ManagedProcess::new(
            vec!["/bin/sh".into(), "-c".into(), "exit $MY_EXIT_CODE".into()],
            envs,
            false,
            TICK,
        );
        p.start();
        wait_stopped(&mut p).await;
        assert_eq!(p.exit_code(), 42);
    }
}
