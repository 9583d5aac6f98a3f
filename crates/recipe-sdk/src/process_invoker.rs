use crate::trace::TraceWriter;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// The duration to wait after sending SIGTERM before escalating to SIGKILL.
const SIGTERM_TIMEOUT: Duration = Duration::from_millis(2500);
/// Upper bound for collecting the remaining output once the process is gone.
/// A background child that inherited the pipes can keep them open forever.
const STREAM_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
/// Size of a single read from the child's stdout.
const READ_CHUNK: usize = 8192;

/// What to launch: a command line handed to the platform shell, or an argv
/// vector executed directly without any shell interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    Shell(String),
    Argv(Vec<String>),
}

impl CommandLine {
    /// Human readable form used in trace output.
    pub fn display(&self) -> String {
        match self {
            CommandLine::Shell(line) => line.clone(),
            CommandLine::Argv(argv) => argv.join(" "),
        }
    }

    fn to_command(&self) -> Result<Command> {
        match self {
            CommandLine::Shell(line) => Ok(shell_command(line)),
            CommandLine::Argv(argv) => {
                let (program, args) = argv
                    .split_first()
                    .context("Argument vector must contain at least the program")?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                Ok(cmd)
            }
        }
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

#[cfg(not(unix))]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(line);
    cmd
}

/// How a launched process came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own. `None` when it was killed by a signal.
    Exited(Option<i32>),
    /// The timeout elapsed and the process was terminated.
    TimedOut(Duration),
    /// The cancellation token fired and the process was terminated.
    Cancelled,
}

/// Result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub termination: Termination,
    /// Everything the process wrote on standard output, decoded lossily.
    pub stdout: String,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    /// Zero exit code, and the process was neither timed out nor cancelled.
    pub fn is_successful(&self) -> bool {
        self.termination == Termination::Exited(Some(0))
    }
}

/// Spawns a child process, captures its stdout, forwards its stderr to the
/// trace writer, and enforces an optional timeout.
///
/// On Unix the child is placed in its own process group so a timeout or a
/// cancellation terminates everything the command started, not only the
/// shell wrapping it.
pub struct ProcessInvoker {
    trace: Arc<dyn TraceWriter>,
}

impl ProcessInvoker {
    /// Create a new `ProcessInvoker` with the given trace writer.
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        Self { trace }
    }

    /// Execute a process and wait for it.
    ///
    /// * `command` - The shell line or argv vector to launch.
    /// * `working_directory` - Optional working directory for the child.
    /// * `timeout` - `None` waits without bound.
    /// * `cancellation_token` - Token to terminate the process early.
    ///
    /// Returns an error only when the process could not be started or waited
    /// on. Non-zero exit codes, timeouts and cancellation are reported through
    /// [`ProcessOutcome::termination`].
    pub async fn execute(
        &self,
        command: &CommandLine,
        working_directory: Option<&Path>,
        timeout: Option<Duration>,
        cancellation_token: CancellationToken,
    ) -> Result<ProcessOutcome> {
        let display = command.display();
        self.trace.info("Starting process:");
        self.trace.info(&format!("  Command: '{display}'"));
        if let Some(dir) = working_directory {
            self.trace
                .info(&format!("  Working directory: '{}'", dir.display()));
        }
        match timeout {
            Some(limit) => self
                .trace
                .info(&format!("  Timeout: {}s", limit.as_secs())),
            None => self.trace.info("  Timeout: none"),
        }

        let mut cmd = command.to_command()?;
        if let Some(dir) = working_directory {
            cmd.current_dir(dir);
        }

        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.stdin(std::process::Stdio::null());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start process '{display}'"))?;

        let pid = child.id().unwrap_or(0);
        self.trace
            .info(&format!("Process started with process id {pid}, waiting for process exit."));

        // Raw bytes, so the captured text keeps its trailing newlines. Reads
        // land in a shared buffer, so whatever arrived survives an aborted drain.
        let captured = Arc::new(Mutex::new(Vec::new()));
        let stdout = child.stdout.take();
        let stdout_buffer = captured.clone();
        let mut stdout_task = tokio::spawn(async move {
            if let Some(mut stdout) = stdout {
                let mut chunk = vec![0u8; READ_CHUNK];
                loop {
                    match stdout.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => stdout_buffer.lock().extend_from_slice(&chunk[..n]),
                    }
                }
            }
        });

        let stderr = child.stderr.take();
        let trace_clone = self.trace.clone();
        let mut stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    trace_clone.verbose(&line);
                }
            }
        });

        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let termination = tokio::select! {
            status = child.wait() => {
                let status = status.context("Failed to wait for process")?;
                Termination::Exited(status.code())
            }
            _ = deadline => {
                let limit = timeout.unwrap_or_default();
                self.trace.warning(&format!(
                    "Process {pid} exceeded the timeout of {}s.",
                    limit.as_secs()
                ));
                self.terminate(&mut child).await;
                Termination::TimedOut(limit)
            }
            _ = cancellation_token.cancelled() => {
                self.trace.info("Cancellation requested.");
                self.terminate(&mut child).await;
                Termination::Cancelled
            }
        };

        // A process that exited on its own only gets what is left of its timeout.
        let drain_budget = match (termination, timeout) {
            (Termination::Exited(_), Some(limit)) => {
                limit.saturating_sub(start.elapsed()).min(STREAM_DRAIN_TIMEOUT)
            }
            _ => STREAM_DRAIN_TIMEOUT,
        };
        let drained = tokio::time::timeout(drain_budget, async {
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
        })
        .await
        .is_ok();
        if !drained {
            stdout_task.abort();
            stderr_task.abort();
            self.trace.warning(
                "Output streams are still held open by another process, keeping what was read so far.",
            );
        }
        let stdout = String::from_utf8_lossy(&captured.lock()).into_owned();

        let elapsed = start.elapsed();
        self.trace.info(&format!(
            "Finished process {pid} with {termination:?}, and elapsed time {elapsed:.2?}."
        ));

        Ok(ProcessOutcome {
            termination,
            stdout,
            elapsed,
        })
    }

    /// Graceful termination: SIGTERM to the process group, then SIGKILL.
    async fn terminate(&self, child: &mut Child) {
        if self.send_sigterm_and_wait(child, SIGTERM_TIMEOUT).await {
            self.trace
                .info("Process terminated successfully through SIGTERM.");
            return;
        }

        self.trace
            .info("Kill entire process group since the terminate signal has been ignored.");
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            let _ = nix::sys::signal::killpg(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGKILL,
            );
        }
        let _ = child.kill().await;
    }

    /// Send SIGTERM to the child's process group and wait up to `timeout` for
    /// the child to exit. Returns `true` if it exited within the timeout.
    #[cfg(unix)]
    async fn send_sigterm_and_wait(&self, child: &mut Child, timeout: Duration) -> bool {
        let pid = match child.id() {
            Some(id) => id,
            None => {
                // Process already exited
                return true;
            }
        };

        self.trace
            .info(&format!("Sending SIGTERM to process group {pid}."));

        let send_result = nix::sys::signal::killpg(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        );
        if send_result.is_err() {
            self.trace
                .info(&format!("SIGTERM signal failed to send to process group {pid}."));
            return false;
        }

        tokio::select! {
            result = child.wait() => {
                result.is_ok()
            }
            _ = tokio::time::sleep(timeout) => {
                self.trace.info(&format!(
                    "Process did not honor SIGTERM within {:.1}s.",
                    timeout.as_secs_f64()
                ));
                false
            }
        }
    }

    #[cfg(not(unix))]
    async fn send_sigterm_and_wait(&self, _child: &mut Child, _timeout: Duration) -> bool {
        // No POSIX signals; go straight to the kill.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{CollectingTraceWriter, NullTraceWriter};

    fn make_invoker() -> ProcessInvoker {
        ProcessInvoker::new(Arc::new(NullTraceWriter))
    }

    fn argv(tokens: &[&str]) -> CommandLine {
        CommandLine::Argv(tokens.iter().map(|t| t.to_string()).collect())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_shell_line_captures_stdout() {
        let outcome = make_invoker()
            .execute(
                &CommandLine::Shell("echo hi".into()),
                None,
                Some(Duration::from_secs(60)),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.is_successful());
        assert_eq!(outcome.stdout, "hi\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_argv_is_not_shell_interpreted() {
        let outcome = make_invoker()
            .execute(
                &argv(&["echo", "$HOME", "a;b"]),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.is_successful());
        assert_eq!(outcome.stdout, "$HOME a;b\n");
    }

    #[tokio::test]
    async fn execute_nonexistent_program_fails_to_start() {
        let result = make_invoker()
            .execute(
                &argv(&["nonexistent_command_xyz_123"]),
                None,
                None,
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_empty_argv_is_an_error() {
        let result = make_invoker()
            .execute(&CommandLine::Argv(vec![]), None, None, CancellationToken::new())
            .await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_unknown_shell_command_is_unsuccessful() {
        let outcome = make_invoker()
            .execute(
                &CommandLine::Shell("nonexistent-command-xyz".into()),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(!outcome.is_successful());
        assert_eq!(outcome.termination, Termination::Exited(Some(127)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_non_zero_exit() {
        let outcome = make_invoker()
            .execute(&argv(&["false"]), None, None, CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.is_successful());
        assert_eq!(outcome.termination, Termination::Exited(Some(1)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_times_out_and_kills() {
        let outcome = make_invoker()
            .execute(
                &CommandLine::Shell("sleep 5".into()),
                None,
                Some(Duration::from_secs(1)),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!outcome.is_successful());
        assert_eq!(
            outcome.termination,
            Termination::TimedOut(Duration::from_secs(1))
        );
        assert!(outcome.elapsed < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_timeout_reaches_grandchildren() {
        // The shell forks `sleep` and waits; both belong to the killed group.
        let outcome = make_invoker()
            .execute(
                &CommandLine::Shell("sleep 5; echo done".into()),
                None,
                Some(Duration::from_secs(1)),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome.termination, Termination::TimedOut(_)));
        assert!(!outcome.stdout.contains("done"));
        assert!(outcome.elapsed < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_background_child_keeps_captured_output() {
        // The backgrounded `sleep` inherits stdout and holds it open.
        let outcome = make_invoker()
            .execute(
                &CommandLine::Shell("echo hi; sleep 8 &".into()),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.is_successful());
        assert_eq!(outcome.stdout, "hi\n");
        assert!(outcome.elapsed < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_output_drain_counts_against_timeout() {
        let outcome = make_invoker()
            .execute(
                &CommandLine::Shell("echo hi; sleep 8 &".into()),
                None,
                Some(Duration::from_secs(1)),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.is_successful());
        assert_eq!(outcome.stdout, "hi\n");
        assert!(outcome.elapsed < Duration::from_millis(1800));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let outcome = make_invoker()
            .execute(&argv(&["sleep", "5"]), None, None, cancel)
            .await
            .unwrap();
        assert_eq!(outcome.termination, Termination::Cancelled);
        assert!(!outcome.is_successful());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), b"x").unwrap();

        let outcome = make_invoker()
            .execute(
                &argv(&["ls"]),
                Some(dir.path()),
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(outcome.is_successful());
        assert_eq!(outcome.stdout, "marker.txt\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_missing_working_directory_fails_to_start() {
        let result = make_invoker()
            .execute(
                &argv(&["ls"]),
                Some(Path::new("/nonexistent_dir_recipe_sdk_xyz")),
                None,
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_goes_to_trace() {
        let trace = Arc::new(CollectingTraceWriter::new());
        let invoker = ProcessInvoker::new(trace.clone());
        let outcome = invoker
            .execute(
                &CommandLine::Shell("echo oops 1>&2".into()),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.is_successful());
        assert_eq!(outcome.stdout, "");
        assert!(trace.contains("oops"));
    }

    #[test]
    fn display_joins_argv() {
        assert_eq!(argv(&["echo", "hi"]).display(), "echo hi");
        assert_eq!(CommandLine::Shell("ls -la".into()).display(), "ls -la");
    }
}
