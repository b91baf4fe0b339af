//! Worker supervisor
//!
//! Runs the generation executor once per task:
//! - Builds the executor command line and environment from the profile
//! - Streams stdout/stderr into the log while keeping them for the result
//! - Enforces the wall-clock timeout, killing the process when it fires
//! - Folds the exit status and the final output line into a [`WorkerResult`]

use async_trait::async_trait;
use reel_core::domain::profile::Profile;
use reel_core::domain::task::{GenerationDuration, Orientation, TaskRequest};
use reel_core::domain::worker::{ExecutorReport, FailureKind, WorkerResult};
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;

/// How long output is still read once the executor has exited
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Parameters of one generation run
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub task_id: Option<String>,
    pub prompt: String,
    pub duration: GenerationDuration,
    pub orientation: Orientation,
    pub image_urls: Vec<String>,
}

impl From<&TaskRequest> for GenerationRequest {
    fn from(task: &TaskRequest) -> Self {
        Self {
            task_id: Some(task.task_id.clone()),
            prompt: task.prompt.clone(),
            duration: task.generation_duration(),
            orientation: task.orientation(),
            image_urls: task.image_urls.clone(),
        }
    }
}

/// Runs one generation on behalf of a profile
///
/// Implementations never fail: every problem ends up in the returned
/// [`WorkerResult`].
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn run_worker(&self, profile: &Profile, request: &GenerationRequest) -> WorkerResult;
}

/// How the executor process is started
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub program: String,

    /// Arguments placed before the generated ones
    pub args: Vec<String>,

    /// Extra environment, on top of the inherited one
    pub env: HashMap<String, String>,

    pub timeout: Duration,
}

impl ExecutorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            program: config.executor_program.clone(),
            args: config.executor_args.clone(),
            env: config.executor_env.clone(),
            timeout: config.task_timeout,
        }
    }
}

/// Supervises generation executor child processes
pub struct WorkerSupervisor {
    settings: ExecutorSettings,
}

impl WorkerSupervisor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    fn command(&self, profile: &Profile, request: &GenerationRequest) -> Command {
        let mut command = Command::new(&self.settings.program);
        command
            .args(&self.settings.args)
            .arg("--profile")
            .arg(&profile.name)
            .arg("--prompt")
            .arg(&request.prompt)
            .arg("--duration")
            .arg(request.duration.seconds().to_string())
            .arg("--orientation")
            .arg(request.orientation.as_str());

        if let Some(task_id) = &request.task_id {
            command.arg("--task-id").arg(task_id);
        }
        for url in &request.image_urls {
            command.arg("--image").arg(url);
        }
        command.arg("--skip-auth");

        command
            .envs(&self.settings.env)
            .env("REEL_PROFILE_NAME", &profile.name)
            .env("REEL_PROFILE_DIR", &profile.session_dir)
            .env("REEL_PROXY", &profile.proxy);
        if let Some(fingerprint) = &profile.fingerprint {
            command.env("REEL_FINGERPRINT", fingerprint);
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl WorkerLauncher for WorkerSupervisor {
    async fn run_worker(&self, profile: &Profile, request: &GenerationRequest) -> WorkerResult {
        let label = request.task_id.clone().unwrap_or_else(|| profile.name.clone());

        let mut child = match self.command(profile, request).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start executor for {}: {}", label, e);
                return WorkerResult::failed(
                    FailureKind::Spawn,
                    format!("failed to start {}: {}", self.settings.program, e),
                );
            }
        };

        info!(
            "Executor started for {} on profile {} (pid {:?})",
            label,
            profile.name,
            child.id()
        );

        let stdout = child
            .stdout
            .take()
            .map(|out| spawn_collector(out, label.clone(), "stdout"));
        let stderr = child
            .stderr
            .take()
            .map(|err| spawn_collector(err, label.clone(), "stderr"));

        let status = match tokio::time::timeout(self.settings.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                abort_collectors([stdout, stderr]);
                return WorkerResult::failed(
                    FailureKind::Exited,
                    format!("failed waiting for executor: {}", e),
                );
            }
            Err(_) => {
                warn!(
                    "Executor for {} exceeded {}s, killing it",
                    label,
                    self.settings.timeout.as_secs()
                );
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill executor for {}: {}", label, e);
                }
                let _ = child.wait().await;
                // Grandchildren may still hold the pipes open
                abort_collectors([stdout, stderr]);
                return WorkerResult::failed(
                    FailureKind::Timeout,
                    format!(
                        "worker timed out after {}s",
                        self.settings.timeout.as_secs()
                    ),
                );
            }
        };

        // A leftover browser may inherit the pipes and never close them
        let deadline = tokio::time::Instant::now() + OUTPUT_GRACE;
        let stdout = collect(stdout, deadline, &label).await;
        let stderr = collect(stderr, deadline, &label).await;

        let result = interpret(status, &stdout, &stderr);
        info!(
            "Executor for {} finished: {}",
            label,
            if result.success {
                "success"
            } else {
                result.error_message()
            }
        );
        result
    }
}

/// Turns a finished executor run into a result
fn interpret(status: ExitStatus, stdout: &str, stderr: &str) -> WorkerResult {
    if status.success() {
        return match ExecutorReport::from_final_line(stdout) {
            Some(report) if !report.success => WorkerResult::reported(report),
            Some(report) if report.public_url.is_some() || report.download_url.is_some() => {
                WorkerResult::succeeded(report)
            }
            _ => WorkerResult::failed(FailureKind::InvalidOutput, "no valid result found"),
        };
    }

    let error_report = |output: &str| ExecutorReport::from_final_line(output).filter(|r| !r.success);
    match error_report(stderr).or_else(|| error_report(stdout)) {
        Some(report) => WorkerResult::reported(report),
        None => WorkerResult::failed(FailureKind::Exited, describe_exit(status)),
    }
}

fn describe_exit(status: ExitStatus) -> String {
    let code = status
        .code()
        .map_or_else(|| "none".to_string(), |c| c.to_string());
    let signal = exit_signal(status).map_or_else(|| "none".to_string(), |s| s.to_string());
    format!("executor exited with code {} (signal {})", code, signal)
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// A stream reader and the lines it has captured so far
struct Collector {
    handle: JoinHandle<()>,
    captured: Arc<Mutex<String>>,
    name: &'static str,
}

impl Collector {
    fn captured(&self) -> String {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Reads a child stream line by line, logging each line
fn spawn_collector<R>(stream: R, label: String, name: &'static str) -> Collector
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let captured = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&captured);

    let handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!("[{}] {}: {}", label, name, line);
                    let mut captured = sink.lock().unwrap_or_else(PoisonError::into_inner);
                    captured.push_str(&line);
                    captured.push('\n');
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read executor {} for {}: {}", name, label, e);
                    break;
                }
            }
        }
    });

    Collector {
        handle,
        captured,
        name,
    }
}

/// Waits for EOF until `deadline`, then keeps whatever was read
async fn collect(
    collector: Option<Collector>,
    deadline: tokio::time::Instant,
    label: &str,
) -> String {
    let Some(mut collector) = collector else {
        return String::new();
    };

    if tokio::time::timeout_at(deadline, &mut collector.handle)
        .await
        .is_err()
    {
        debug!(
            "Executor {} for {} still open after exit, abandoning it",
            collector.name, label
        );
        collector.handle.abort();
    }
    collector.captured()
}

fn abort_collectors(collectors: [Option<Collector>; 2]) {
    for collector in collectors.into_iter().flatten() {
        collector.handle.abort();
    }
}
