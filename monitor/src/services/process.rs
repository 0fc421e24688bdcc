//! Real child process management
//!
//! Spawns a worker executable, captures its merged stdout and stderr into a
//! bounded in-memory ring of recent lines, and offers kill-and-wait style
//! shutdown to the watchdogs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::WorkerSpec;
use crate::error::{MonitorError, MonitorResult};
use crate::traits::ProcessControl;
use shared::{process_debug, process_error, process_warn, Participant};

/// At most this many recent output lines are retained per process.
const MAX_OUTPUT_LINES: usize = 1000;

/// How often to re-check for exit while waiting on a stopping process.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One managed worker process.
pub struct MonitoredProcess {
    participant: Participant,
    spec: WorkerSpec,
    child: Arc<Mutex<Option<Child>>>,
    output: Arc<Mutex<VecDeque<String>>>,
    capture_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MonitoredProcess {
    pub fn new(participant: Participant, spec: WorkerSpec) -> MonitoredProcess {
        MonitoredProcess {
            participant,
            spec,
            child: Arc::new(Mutex::new(None)),
            output: Arc::new(Mutex::new(VecDeque::new())),
            capture_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn participant(&self) -> Participant {
        self.participant
    }

    /// Snapshot of the retained output lines, oldest first.
    pub async fn recent_output(&self) -> Vec<String> {
        self.output.lock().await.iter().cloned().collect()
    }

    fn capture<R>(&self, stream: R, label: &'static str) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let participant = self.participant;
        let output = Arc::clone(&self.output);
        let child = Arc::clone(&self.child);

        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let mut buf = output.lock().await;
                        if buf.len() >= MAX_OUTPUT_LINES {
                            buf.pop_front();
                        }
                        buf.push_back(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        process_error!(participant, "{} capture failed: {}", label, e);
                        // a broken pipe with a live child means the process
                        // is wedged; take it down so the watchdog restarts it
                        if let Some(c) = child.lock().await.as_mut() {
                            let _ = c.start_kill();
                        }
                        break;
                    }
                }
            }
        })
    }

    async fn abort_capture(&self) {
        for task in self.capture_tasks.lock().await.drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl ProcessControl for MonitoredProcess {
    async fn is_alive(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn run(&self) -> MonitorResult<()> {
        if self.is_alive().await {
            return Err(MonitorError::process(format!(
                "{} is already running",
                self.participant
            )));
        }

        let mut command = Command::new(&self.spec.executable);
        command
            .args(&self.spec.args)
            .current_dir(&self.spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            MonitorError::process(format!(
                "failed to spawn {} ({}): {}",
                self.participant,
                self.spec.executable.display(),
                e
            ))
        })?;

        self.output.lock().await.clear();

        let mut tasks = self.capture_tasks.lock().await;
        if let Some(stdout) = child.stdout.take() {
            tasks.push(self.capture(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tasks.push(self.capture(stderr, "stderr"));
        }
        drop(tasks);

        process_debug!(
            self.participant,
            "spawned {} (pid {:?})",
            self.spec.executable.display(),
            child.id()
        );
        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn stop(&self) {
        let taken = self.child.lock().await.take();
        match taken {
            Some(mut child) => {
                if let Err(e) = child.kill().await {
                    process_warn!(self.participant, "kill failed: {}", e);
                }
                let _ = child.wait().await;
                process_debug!(self.participant, "process stopped");
            }
            None => {
                process_debug!(self.participant, "stop requested but process not running");
            }
        }
        self.abort_capture().await;
        self.output.lock().await.clear();
    }

    async fn wait_for_exit(&self) {
        loop {
            {
                let mut guard = self.child.lock().await;
                match guard.as_mut() {
                    Some(child) => {
                        if let Ok(Some(_)) = child.try_wait() {
                            return;
                        }
                    }
                    None => return,
                }
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec(executable: &str, args: &[&str]) -> WorkerSpec {
        WorkerSpec {
            ip: "127.0.0.1".to_string(),
            port: 0,
            working_dir: PathBuf::from("/tmp"),
            executable: PathBuf::from(executable),
            args: args.iter().map(|s| s.to_string()).collect(),
            test_url: "http://127.0.0.1/".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fresh_process_is_not_alive() {
        let p = MonitoredProcess::new(Participant::Http, spec("/bin/true", &[]));
        assert!(!p.is_alive().await);
    }

    #[tokio::test]
    async fn test_stop_without_running_process_is_noop() {
        let p = MonitoredProcess::new(Participant::Http, spec("/bin/true", &[]));
        p.stop().await;
        assert!(!p.is_alive().await);
    }

    #[tokio::test]
    async fn test_run_with_missing_executable_fails() {
        let p = MonitoredProcess::new(
            Participant::Http,
            spec("/nonexistent/definitely-not-a-binary", &[]),
        );
        let err = p.run().await.unwrap_err();
        assert!(matches!(err, MonitorError::Process { .. }));
    }

    #[tokio::test]
    async fn test_output_capture_and_exit_wait() {
        let p = MonitoredProcess::new(
            Participant::Http,
            spec("/bin/sh", &["-c", "echo one; echo two"]),
        );
        p.run().await.unwrap();
        p.wait_for_exit().await;
        // capture tasks may still be draining the pipe just after exit
        tokio::time::sleep(Duration::from_millis(100)).await;

        let lines = p.recent_output().await;
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
        assert!(!p.is_alive().await);
    }

    #[tokio::test]
    async fn test_rerun_after_exit_succeeds() {
        let p = MonitoredProcess::new(Participant::Http, spec("/bin/true", &[]));
        p.run().await.unwrap();
        p.wait_for_exit().await;
        p.run().await.unwrap();
        p.stop().await;
    }

    #[tokio::test]
    async fn test_stop_kills_long_running_process() {
        let p = MonitoredProcess::new(Participant::Http, spec("/bin/sleep", &["300"]));
        p.run().await.unwrap();
        assert!(p.is_alive().await);
        p.stop().await;
        assert!(!p.is_alive().await);
    }
}
