//! Spawns a binary under test and supervises its output streams.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use berth_core::ExecutorError;

use crate::pattern::{DEFAULT_FAULT_PATTERN, PatternDetector};

/// Fluent configuration for an [`Executor`].
///
/// ```no_run
/// # use berth_executor::ExecutorBuilder;
/// # async fn demo() -> Result<(), berth_core::ExecutorError> {
/// let mut exec = ExecutorBuilder::new("target/debug/my-daemon")
///     .with_args(["--port", "0"])
///     .with_env_var("RUST_LOG", "debug")
///     .with_ready_pattern("listening on")
///     .build();
/// exec.start()?;
/// exec.wait_ready(std::time::Duration::from_secs(10)).await?;
/// // ... drive the daemon ...
/// exec.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ExecutorBuilder {
    binary: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    output_file: Option<PathBuf>,
    errors_file: Option<PathBuf>,
    fault_pattern: String,
    ready_pattern: Option<String>,
    quiet: bool,
}

impl ExecutorBuilder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            output_file: None,
            errors_file: None,
            fault_pattern: DEFAULT_FAULT_PATTERN.to_string(),
            ready_pattern: None,
            quiet: false,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replaces the whole environment override map.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Tees stdout lines into the given file.
    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    /// Tees stderr lines into the given file.
    pub fn with_errors_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.errors_file = Some(path.into());
        self
    }

    /// Overrides the fault pattern scanned for on both streams. An
    /// empty pattern disables fault detection.
    pub fn with_fault_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.fault_pattern = pattern.into();
        self
    }

    /// Marks the process ready once a line containing `pattern` shows
    /// up on either stream. Required for [`Executor::wait_ready`].
    pub fn with_ready_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ready_pattern = Some(pattern.into());
        self
    }

    /// Suppresses the stdout passthrough to the test's own stderr.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn build(self) -> Executor {
        let stdout_detector = Arc::new(PatternDetector::new(self.fault_pattern.clone()));
        let stderr_detector = Arc::new(PatternDetector::new(self.fault_pattern));
        Executor {
            binary: self.binary,
            args: self.args,
            env: self.env,
            output_file: self.output_file,
            errors_file: self.errors_file,
            ready_pattern: self.ready_pattern,
            quiet: self.quiet,
            stdout_detector,
            stderr_detector,
            child: None,
            readers: Vec::new(),
            ready_rx: None,
        }
    }
}

/// Runs one binary with piped output, scanning every line for fault
/// patterns and, optionally, a readiness marker.
///
/// Two shapes of use: [`Executor::run`] for commands that run to
/// completion, and [`Executor::start`] / [`Executor::stop`] for
/// daemons the test drives while they are up.
#[derive(Debug)]
pub struct Executor {
    binary: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    output_file: Option<PathBuf>,
    errors_file: Option<PathBuf>,
    ready_pattern: Option<String>,
    quiet: bool,
    stdout_detector: Arc<PatternDetector>,
    stderr_detector: Arc<PatternDetector>,
    child: Option<Child>,
    readers: Vec<JoinHandle<()>>,
    ready_rx: Option<watch::Receiver<bool>>,
}

impl Executor {
    /// Spawns the process without waiting for it to exit.
    ///
    /// Reader tasks for stdout and stderr are started alongside. They
    /// run until the process closes its streams on exit.
    pub fn start(&mut self) -> Result<(), ExecutorError> {
        let mut command = Command::new(&self.binary);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|source| ExecutorError::SpawnFailed {
                binary: self.binary.clone(),
                source,
            })?;
        tracing::debug!(binary = %self.binary, pid = ?child.id(), "process spawned");

        let (ready_tx, ready_rx) = watch::channel(false);
        let ready_tx = Arc::new(ready_tx);
        self.ready_rx = Some(ready_rx);

        if let Some(stdout) = child.stdout.take() {
            self.readers.push(spawn_reader(
                stdout,
                Arc::clone(&self.stdout_detector),
                self.output_file.clone(),
                self.ready_pattern.clone(),
                Arc::clone(&ready_tx),
                !self.quiet,
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            self.readers.push(spawn_reader(
                stderr,
                Arc::clone(&self.stderr_detector),
                self.errors_file.clone(),
                self.ready_pattern.clone(),
                Arc::clone(&ready_tx),
                true,
            ));
        }

        self.child = Some(child);
        Ok(())
    }

    /// Blocks until the ready pattern configured at build time appears
    /// on either output stream.
    pub async fn wait_ready(&mut self, timeout: Duration) -> Result<(), ExecutorError> {
        let pattern = self
            .ready_pattern
            .clone()
            .ok_or_else(|| ExecutorError::Wait("no ready pattern configured".to_string()))?;
        let rx = self.ready_rx.as_mut().ok_or(ExecutorError::NotStarted)?;

        let seen = tokio::time::timeout(timeout, rx.wait_for(|ready| *ready)).await;
        match seen {
            Ok(Ok(_)) => Ok(()),
            // The sender side is dropped once both readers finish, so a
            // closed channel means the process exited before the marker.
            Ok(Err(_)) | Err(_) => Err(ExecutorError::ReadyTimeout {
                pattern,
                secs: timeout.as_secs(),
            }),
        }
    }

    /// Runs the process to completion.
    ///
    /// Fails on a non-zero exit code and, after a clean exit, on any
    /// fault pattern hit in the captured output.
    pub async fn run(&mut self) -> Result<(), ExecutorError> {
        if self.child.is_none() {
            self.start()?;
        }
        let mut child = self.child.take().ok_or(ExecutorError::NotStarted)?;
        let status = child
            .wait()
            .await
            .map_err(|err| ExecutorError::Wait(err.to_string()))?;
        self.join_readers().await;

        if let Some(code) = status.code().filter(|code| *code != 0) {
            return Err(ExecutorError::NonZeroExit {
                binary: self.binary.clone(),
                code,
            });
        }
        self.check_output()
    }

    /// Sends SIGTERM, waits for the process to exit, and checks the
    /// captured output for fault patterns.
    ///
    /// Exiting on the signal itself is fine; only a non-zero exit code
    /// counts as a failure here.
    pub async fn stop(&mut self) -> Result<(), ExecutorError> {
        let mut child = self.child.take().ok_or(ExecutorError::NotStarted)?;

        if let Some(pid) = child.id() {
            signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
                .map_err(|err| ExecutorError::Signal(err.to_string()))?;
            tracing::debug!(binary = %self.binary, pid, "sent SIGTERM");
        }

        let status = child
            .wait()
            .await
            .map_err(|err| ExecutorError::Wait(err.to_string()))?;
        self.join_readers().await;

        if let Some(code) = status.code().filter(|code| *code != 0) {
            return Err(ExecutorError::NonZeroExit {
                binary: self.binary.clone(),
                code,
            });
        }
        self.check_output()
    }

    /// Fails if any fault pattern was seen on stdout or stderr.
    pub fn check_output(&self) -> Result<(), ExecutorError> {
        let hits = self.stdout_detector.hits() + self.stderr_detector.hits();
        if hits > 0 {
            return Err(ExecutorError::PatternDetected {
                pattern: self.stdout_detector.pattern().to_string(),
                hits,
            });
        }
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.child.is_some()
    }

    async fn join_readers(&mut self) {
        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }
    }
}

fn spawn_reader<R>(
    stream: R,
    detector: Arc<PatternDetector>,
    file: Option<PathBuf>,
    ready_pattern: Option<String>,
    ready_tx: Arc<watch::Sender<bool>>,
    passthrough: bool,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut sink = match file {
            Some(path) => match tokio::fs::File::create(&path).await {
                Ok(file) => Some(file),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "cannot open capture file");
                    None
                }
            },
            None => None,
        };

        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            detector.scan_line(&line);
            if let Some(pattern) = &ready_pattern
                && line.contains(pattern.as_str())
            {
                let _ = ready_tx.send(true);
            }
            if let Some(sink) = sink.as_mut() {
                let _ = sink.write_all(line.as_bytes()).await;
                let _ = sink.write_all(b"\n").await;
            }
            if passthrough {
                eprintln!("{line}");
            }
        }
        if let Some(mut sink) = sink.take() {
            let _ = sink.flush().await;
        }
    })
}
