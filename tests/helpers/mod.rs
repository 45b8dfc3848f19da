// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const POLL: Duration = Duration::from_millis(25);

/// Poll `check` until it holds or `timeout` elapses.
pub fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !check() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL);
    }
    true
}

pub fn child_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

pub fn child_gone(pid: u32) -> bool {
    eventually(WAIT_TIMEOUT, || !child_alive(pid))
}

/// Builder for one dd-supervise invocation. Config and lock fixtures live in
/// a per-test temporary directory that stays alive for the whole run, so
/// tests can edit them while the binary is watching.
pub struct Supervise {
    dir: tempfile::TempDir,
    flags: Vec<String>,
    command: Vec<String>,
}

impl Supervise {
    pub fn run(command: &[&str]) -> Self {
        Self {
            dir: tempfile::tempdir().expect("fixture dir"),
            flags: Vec::new(),
            command: command.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Supervise a /bin/sh script.
    pub fn shell(script: &str) -> Self {
        Self::run(&["/bin/sh", "-c", script])
    }

    pub fn flag(mut self, flag: &str) -> Self {
        self.flags.push(flag.to_string());
        self
    }

    /// Write a config fixture into the test directory and point the run at
    /// it. The file can be rewritten later through `config_path`.
    pub fn config(self, format: &str, file_name: &str, contents: &str) -> Self {
        let path = self.dir.path().join(file_name);
        std::fs::write(&path, contents).expect("write config fixture");
        self.flag("-f")
            .flag(format)
            .flag("-c")
            .flag(&path.display().to_string())
    }

    /// Serialize the run through a lock file in the test directory.
    pub fn lock_file(self) -> Self {
        let path = self.lock_path().display().to_string();
        self.flag("-l").flag(&path)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.path().join("run.lock")
    }

    /// Launch the binary, capturing stdout and stderr into one buffer.
    pub fn spawn(self) -> Run {
        let mut child = Command::new(env!("CARGO_BIN_EXE_dd-supervise"))
            .args(&self.flags)
            .arg("--")
            .args(&self.command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("start dd-supervise");

        let output = Arc::new(Mutex::new(String::new()));
        tee(child.stdout.take().expect("pipe stdout"), &output);
        tee(child.stderr.take().expect("pipe stderr"), &output);

        Run {
            child,
            dir: self.dir,
            output,
        }
    }
}

/// Mirror a child stream to the test's stderr while collecting it.
fn tee(mut stream: impl Read + Send + 'static, sink: &Arc<Mutex<String>>) {
    let sink = Arc::clone(sink);
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    eprint!("{text}");
                    sink.lock().unwrap().push_str(&text);
                }
            }
        }
    });
}

/// A running dd-supervise process plus everything it printed so far.
pub struct Run {
    child: Child,
    dir: tempfile::TempDir,
    output: Arc<Mutex<String>>,
}

impl Run {
    pub fn occurrences(&self, pattern: &str) -> usize {
        self.output.lock().unwrap().matches(pattern).count()
    }

    /// Wait for `pattern` to show up in the output.
    pub fn saw(&self, pattern: &str) -> bool {
        self.saw_within(pattern, WAIT_TIMEOUT)
    }

    pub fn saw_within(&self, pattern: &str, timeout: Duration) -> bool {
        eventually(timeout, || self.occurrences(pattern) > 0)
    }

    /// Wait for at least `n` occurrences of `pattern`.
    pub fn saw_times(&self, pattern: &str, n: usize) -> bool {
        eventually(WAIT_TIMEOUT, || self.occurrences(pattern) >= n)
    }

    /// PIDs of every supervised child launched so far, in spawn order,
    /// recovered from the "spawned (pid=NNN" log lines.
    pub fn child_pids(&self) -> Vec<u32> {
        let output = self.output.lock().unwrap();
        output
            .match_indices("spawned (pid=")
            .filter_map(|(at, marker)| {
                let digits = &output[at + marker.len()..];
                let end = digits
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(digits.len());
                digits[..end].parse().ok()
            })
            .collect()
    }

    /// Send a signal to the supervisor itself, not the supervised child.
    pub fn signal(&self, sig: Signal) {
        let pid = Pid::from_raw(self.child.id() as i32);
        signal::kill(pid, sig).expect("signal dd-supervise");
    }

    /// Wait for the process to finish and return its exit code. Panics if it
    /// is still running after `WAIT_TIMEOUT`.
    pub fn exit_code(&mut self) -> i32 {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            if let Some(status) = self.child.try_wait().expect("wait on dd-supervise") {
                return status.code().unwrap_or(-1);
            }
            if Instant::now() >= deadline {
                self.child.kill().ok();
                self.child.wait().ok();
                panic!("dd-supervise still running after {WAIT_TIMEOUT:?}");
            }
            std::thread::sleep(POLL);
        }
    }

    /// SIGTERM the supervisor and collect its exit code.
    pub fn interrupt(&mut self) -> i32 {
        self.signal(Signal::SIGTERM);
        self.exit_code()
    }

    pub fn config_path(&self, file_name: &str) -> PathBuf {
        self.dir.path().join(file_name)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.path().join("run.lock")
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
