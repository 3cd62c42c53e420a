use crate::backend::{Backend, BackendStatus, EvalSuccess};
use crate::env_scrub::scrubbed_env;
use crate::error::EvalError;
use crate::injection::{self, TIMEOUT_MARKER};
use crate::output_parser::parse_eval_output;
use crate::restart_ledger::RestartLedger;
use async_trait::async_trait;
use consolle_core::{
    DEFAULT_EVAL_TIMEOUT_SECS, HEALTH_CHECK_TIMEOUT_SECS, MAX_OUTPUT_BYTES, RESTART_DELAY_MS,
    SessionConfig, generate_request_id,
};
use consolle_pty::{PtyChild, ReadEvent};
use consolle_sanitizer::{PromptMatcher, sanitize};
use nix::sys::signal::Signal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DSR_QUERY: &[u8] = b"\x1b[6n";
const DSR_REPLY: &[u8] = b"\x1b[1;1R";

fn effective_timeout(requested: Option<Duration>) -> Duration {
    if let Ok(raw) = std::env::var("CONSOLLE_TIMEOUT") {
        if let Ok(secs) = raw.parse::<u64>() {
            if secs > 0 {
                return Duration::from_secs(secs);
            }
        }
    }
    requested.unwrap_or(Duration::from_secs(DEFAULT_EVAL_TIMEOUT_SECS))
}

fn pre_sigint_globally_disabled() -> bool {
    std::env::var("CONSOLLE_DISABLE_PRE_SIGINT").as_deref() == Ok("1")
}

fn build_reprogram_command() -> String {
    let sentinel = consolle_sanitizer::SENTINEL_PROMPT;
    format!(
        "begin; IRB.conf[:USE_PAGER] = false; IRB.conf[:USE_AUTOCOMPLETE] = false; \
         IRB.conf[:USE_MULTILINE] = false; IRB.conf[:USE_COLORIZE] = false; \
         IRB.conf[:PROMPT][:CONSOLLE] = {{ PROMPT_I: \"{sentinel} \", PROMPT_S: \"\", \
         PROMPT_C: \"\", RETURN: \"=> %s\\n\" }}; IRB.conf[:PROMPT_MODE] = :CONSOLLE; \
         rescue StandardError; end; nil"
    )
}

async fn respond_to_dsr(child: &PtyChild, chunk: &[u8]) {
    if chunk
        .windows(DSR_QUERY.len())
        .any(|window| window == DSR_QUERY)
    {
        let _ = child.write_all(DSR_REPLY).await;
    }
}

/// Outcome of reading PTY output until a prompt appears or time runs out.
enum CollectOutcome {
    Prompt(String),
    /// The inner `Timeout.timeout(T-1)` wrapper caught `Timeout::Error`
    /// itself, printed `TIMEOUT_MARKER`, and returned to a fresh prompt
    /// before the outer deadline elapsed (spec.md section 4.4.2 step 4):
    /// this is still a timeout outcome for the caller, just one the child
    /// recovered from cleanly, with no Ctrl-C needed.
    InnerTimeout,
    Timeout,
    Eof,
}

#[derive(Default)]
struct ProcessState {
    child: Option<PtyChild>,
    running: bool,
    restart_ledger: RestartLedger,
}

/// Supervises one PTY-hosted interactive console (spec.md section 4.4):
/// owns spawn/eval/restart/stop, serialized against the watchdog by a
/// dedicated process-lifecycle mutex distinct from the evaluation mutex.
pub struct PtySupervisor {
    config: SessionConfig,
    prompt: PromptMatcher,
    eval_mutex: Mutex<()>,
    process: Mutex<ProcessState>,
}

impl PtySupervisor {
    pub async fn new(config: SessionConfig) -> Result<Arc<Self>, EvalError> {
        let prompt = match &config.custom_prompt_pattern {
            Some(pattern) => PromptMatcher::from_pattern(pattern).map_err(|e| {
                EvalError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?,
            None => PromptMatcher::default(),
        };

        let supervisor = Arc::new(Self {
            config,
            prompt,
            eval_mutex: Mutex::new(()),
            process: Mutex::new(ProcessState::default()),
        });

        {
            let mut state = supervisor.process.lock().await;
            supervisor.spawn_child(&mut state).await?;
        }

        Ok(supervisor)
    }

    /// Periodic liveness check, called by the watchdog (spec.md section
    /// 4.5). Exclusive with `eval`/`restart`/`stop` via `process`.
    pub async fn watchdog_tick(&self) {
        let mut state = self.process.lock().await;
        if !state.running {
            return;
        }
        let alive = matches!(
            state.child.as_mut().map(|c| c.try_wait()),
            Some(Ok(None))
        );
        if !alive {
            tracing::warn!(target: "consolle_supervisor::watchdog", "child is dead, respawning");
            tokio::time::sleep(Duration::from_millis(RESTART_DELAY_MS)).await;
            if let Err(error) = self.spawn_child(&mut state).await {
                tracing::error!(target: "consolle_supervisor::watchdog", %error, "respawn failed");
            }
        }
    }

    async fn spawn_child(&self, state: &mut ProcessState) -> Result<(), EvalError> {
        let env = scrubbed_env(&self.config.environment);
        let child = PtyChild::spawn(
            &self.config.launch_command,
            &self.config.project_root,
            24,
            120,
            &env,
        )?;

        let deadline = Instant::now() + Duration::from_secs(self.config.initial_wait_secs);
        let mut raw = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(EvalError::ServerUnhealthy);
            }
            match tokio::time::timeout(remaining, child.read_chunk(4096)).await {
                Ok(Ok(ReadEvent::Data(bytes))) => {
                    respond_to_dsr(&child, &bytes).await;
                    raw.extend_from_slice(&bytes);
                    if self.prompt.find_prompt_line(&sanitize(&raw)).is_some() {
                        break;
                    }
                }
                Ok(Ok(ReadEvent::Eof)) => return Err(EvalError::ConsoleTerminated),
                Ok(Err(error)) => return Err(EvalError::Io(error)),
                Err(_) => return Err(EvalError::ServerUnhealthy),
            }
        }

        let reprogram = build_reprogram_command();
        child
            .write_all(reprogram.as_bytes())
            .await
            .map_err(EvalError::Io)?;
        child.write_all(b"\n").await.map_err(EvalError::Io)?;
        self.drain_for(&child, Duration::from_millis(300)).await;

        if self.config.is_remote() {
            let _ = child.write_all(&[0x03]).await;
            self.drain_for(&child, Duration::from_millis(300)).await;
            let marker = format!("__consolle_marker_{}__", generate_request_id());
            let probe = format!("puts '{marker}'\n");
            if child.write_all(probe.as_bytes()).await.is_ok() {
                let _ = self
                    .wait_for(
                        &child,
                        Duration::from_secs(3),
                        |sanitized| sanitized.contains(&marker),
                    )
                    .await;
            }
        }

        state.child = Some(child);
        state.running = true;
        tracing::info!(
            target: "consolle_supervisor",
            pid = state.child.as_ref().map(|c| c.pid()).unwrap_or(-1),
            "spawn"
        );
        let exceeded = state.restart_ledger.record(Instant::now());
        if exceeded {
            tracing::warn!(
                target: "consolle_supervisor",
                restarts = state.restart_ledger.len(),
                "restart rate exceeded MAX_RESTARTS within RESTART_WINDOW"
            );
        }
        Ok(())
    }

    async fn wait_for(
        &self,
        child: &PtyChild,
        timeout: Duration,
        predicate: impl Fn(&str) -> bool,
    ) -> Result<(), EvalError> {
        let deadline = Instant::now() + timeout;
        let mut raw = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(EvalError::ServerUnhealthy);
            }
            match tokio::time::timeout(remaining, child.read_chunk(4096)).await {
                Ok(Ok(ReadEvent::Data(bytes))) => {
                    respond_to_dsr(child, &bytes).await;
                    raw.extend_from_slice(&bytes);
                    if predicate(&sanitize(&raw)) {
                        return Ok(());
                    }
                }
                Ok(Ok(ReadEvent::Eof)) => return Err(EvalError::ConsoleTerminated),
                Ok(Err(error)) => return Err(EvalError::Io(error)),
                Err(_) => return Err(EvalError::ServerUnhealthy),
            }
        }
    }

    async fn drain_for(&self, child: &PtyChild, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            match tokio::time::timeout(remaining, child.read_chunk(4096)).await {
                Ok(Ok(ReadEvent::Data(bytes))) => {
                    respond_to_dsr(child, &bytes).await;
                }
                _ => return,
            }
        }
    }

    /// Pre-exec health check (spec.md section 4.4.2 step 1): Ctrl-C plus a
    /// probe statement, expecting either the probe marker or a fresh
    /// prompt within `HEALTH_CHECK_TIMEOUT_SECS`.
    async fn health_check(&self, state: &mut ProcessState) -> Result<(), EvalError> {
        let healthy = match state.child.as_ref() {
            None => false,
            Some(child) => {
                let _ = child.write_all(&[0x03]).await;
                let probe_marker = "__consolle_probe__";
                let _ = child
                    .write_all(format!("puts '{probe_marker}'\n").as_bytes())
                    .await;
                self.wait_for(
                    child,
                    Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS),
                    |sanitized| {
                        sanitized.contains(probe_marker)
                            || self.prompt.find_prompt_line(sanitized).is_some()
                    },
                )
                .await
                .is_ok()
            }
        };

        if healthy {
            return Ok(());
        }

        tracing::warn!(target: "consolle_supervisor", "pre-exec health check failed, restarting");
        state.running = false;
        self.stop_child(state).await;
        state.running = true;
        self.spawn_child(state).await.ok();
        Err(EvalError::ServerUnhealthy)
    }

    async fn stop_child(&self, state: &mut ProcessState) {
        let Some(mut child) = state.child.take() else {
            return;
        };

        let _ = child.write_all(b"exit\n").await;

        let wait_deadline = Instant::now() + Duration::from_secs(3);
        let mut exited = false;
        while Instant::now() < wait_deadline {
            if matches!(child.try_wait(), Ok(Some(_))) {
                exited = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if !exited {
            child.signal_group(Signal::SIGTERM);
            tokio::time::sleep(Duration::from_millis(300)).await;
            if !matches!(child.try_wait(), Ok(Some(_))) {
                child.signal_group(Signal::SIGKILL);
            }
            let _ = child.wait();
        }
    }
}

#[async_trait]
impl Backend for PtySupervisor {
    async fn eval(&self, code: &str, timeout: Option<Duration>) -> Result<EvalSuccess, EvalError> {
        let _eval_guard = self.eval_mutex.lock().await;
        let started = Instant::now();
        let timeout = effective_timeout(timeout);

        let mut state = self.process.lock().await;

        if self.config.pre_sigint_enabled && !pre_sigint_globally_disabled() {
            self.health_check(&mut state).await?;
        }

        let tmp_dir = self.config.project_root.join("tmp");
        tokio::fs::create_dir_all(&tmp_dir)
            .await
            .map_err(EvalError::Io)?;
        let injection = injection::build_injection(code, timeout.as_secs(), &tmp_dir)
            .map_err(EvalError::Io)?;

        let Some(child) = state.child.as_ref() else {
            return Err(EvalError::ConsoleTerminated);
        };

        let pid = child.pid();
        tracing::debug!(target: "consolle_supervisor", pid, bytes = code.len(), "eval.start");

        child
            .write_all(injection.line.as_bytes())
            .await
            .map_err(EvalError::Io)?;
        child.write_all(b"\n").await.map_err(EvalError::Io)?;

        let outcome = self.collect_eval_output(child, timeout).await;

        if let Some(path) = &injection.temp_file {
            let _ = tokio::fs::remove_file(path).await;
        }

        match outcome {
            CollectOutcome::Prompt(sanitized) => {
                let elapsed = started.elapsed();
                let (trimmed, truncated) = truncate_if_needed(sanitized);
                match parse_eval_output(&trimmed, &self.prompt) {
                    Ok(text) => {
                        tracing::debug!(
                            target: "consolle_supervisor",
                            pid,
                            execution_time = elapsed.as_secs_f64(),
                            truncated,
                            "eval.ok"
                        );
                        Ok(EvalSuccess {
                            output: text,
                            execution_time: elapsed,
                            truncated,
                        })
                    }
                    Err(error) => {
                        tracing::debug!(target: "consolle_supervisor", pid, %error, "eval.error");
                        Err(error)
                    }
                }
            }
            CollectOutcome::InnerTimeout => {
                // The injected `Timeout.timeout(T-1)` wrapper already caught
                // `Timeout::Error` itself and the child is back at a fresh
                // prompt (spec.md section 4.4.2 step 4); no Ctrl-C/drain
                // recovery is needed, unlike the outer-deadline case below.
                tracing::warn!(target: "consolle_supervisor", pid, "eval.timeout");
                Err(EvalError::ExecutionTimeout)
            }
            CollectOutcome::Timeout => {
                tracing::warn!(target: "consolle_supervisor", pid, "eval.timeout");
                if let Some(child) = state.child.as_ref() {
                    let _ = child.write_all(&[0x03]).await;
                    self.drain_for(child, Duration::from_millis(500)).await;
                }
                Err(EvalError::ExecutionTimeout)
            }
            CollectOutcome::Eof => {
                tracing::warn!(target: "consolle_supervisor", pid, "eval.eof");
                state.child = None;
                Err(EvalError::ConsoleTerminated)
            }
        }
    }

    async fn status(&self) -> BackendStatus {
        let state = self.process.lock().await;
        BackendStatus {
            running: state.running,
            pid: state.child.as_ref().map(|c| c.pid() as u32),
            rails_root: self.config.project_root.clone(),
            rails_env: self.config.environment.clone(),
        }
    }

    async fn restart(&self) -> Result<BackendStatus, EvalError> {
        tracing::info!(target: "consolle_supervisor", "restart");
        let mut state = self.process.lock().await;
        state.running = false;
        self.stop_child(&mut state).await;
        state.running = true;
        self.spawn_child(&mut state).await?;
        drop(state);
        Ok(self.status().await)
    }

    async fn stop(&self) {
        tracing::info!(target: "consolle_supervisor", "stop");
        let mut state = self.process.lock().await;
        state.running = false;
        self.stop_child(&mut state).await;
    }
}

impl PtySupervisor {
    async fn collect_eval_output(&self, child: &PtyChild, timeout: Duration) -> CollectOutcome {
        let deadline = Instant::now() + timeout;
        let mut raw = Vec::new();
        let mut saw_timeout_marker = false;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return if saw_timeout_marker {
                    CollectOutcome::InnerTimeout
                } else {
                    CollectOutcome::Timeout
                };
            }

            match tokio::time::timeout(remaining, child.read_chunk(8192)).await {
                Ok(Ok(ReadEvent::Data(bytes))) => {
                    respond_to_dsr(child, &bytes).await;
                    raw.extend_from_slice(&bytes);
                    let sanitized = sanitize(&raw);
                    if sanitized.contains(TIMEOUT_MARKER) {
                        saw_timeout_marker = true;
                    }
                    if self.prompt.find_prompt_line(&sanitized).is_some() {
                        self.drain_for(child, Duration::from_millis(100)).await;
                        return if saw_timeout_marker {
                            CollectOutcome::InnerTimeout
                        } else {
                            CollectOutcome::Prompt(sanitize(&raw))
                        };
                    }
                }
                Ok(Ok(ReadEvent::Eof)) => return CollectOutcome::Eof,
                Ok(Err(_)) => return CollectOutcome::Eof,
                Err(_) => {
                    if saw_timeout_marker {
                        return CollectOutcome::InnerTimeout;
                    }
                    return CollectOutcome::Timeout;
                }
            }
        }
    }
}

fn truncate_if_needed(sanitized: String) -> (String, bool) {
    if sanitized.len() > MAX_OUTPUT_BYTES {
        let mut truncated = sanitized;
        truncated.truncate(MAX_OUTPUT_BYTES);
        (truncated, true)
    } else {
        (sanitized, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consolle_core::BackendKind;
    use std::path::PathBuf;

    fn fake_console_config(script: &str) -> SessionConfig {
        SessionConfig {
            project_root: PathBuf::from("/tmp"),
            environment: "test".to_string(),
            launch_command: script.to_string(),
            initial_wait_secs: 5,
            custom_prompt_pattern: Some(r"^app\(test\)>\s*$".to_string()),
            backend: BackendKind::Pty,
            pre_sigint_enabled: false,
        }
    }

    #[tokio::test]
    async fn spawns_against_a_fake_prompt_script() {
        // A trivial shell "console" that immediately prints a prompt and
        // then echoes whatever it receives, good enough to exercise the
        // initial-wait and reprogramming path without a real Ruby/IRB.
        let script = "sh -c 'printf \"app(test)> \"; cat'";
        let config = fake_console_config(script);
        let supervisor = PtySupervisor::new(config).await.expect("spawn supervisor");
        let status = supervisor.status().await;
        assert!(status.running);
        supervisor.stop().await;
    }

    #[tokio::test]
    async fn inner_timeout_marker_is_reported_as_execution_timeout_not_success() {
        // "cat" echoes the injected line straight back, including the
        // literal `__consolle_timeout__` text embedded in its rescue
        // clause, but never emits a fresh prompt afterwards. That is
        // enough to exercise the marker-detection path: it must surface
        // as `EvalError::ExecutionTimeout`, never as a successful result
        // (this is the behavior review comment 1 required).
        let script = "sh -c 'printf \"app(test)> \"; cat'";
        let config = fake_console_config(script);
        let supervisor = PtySupervisor::new(config).await.expect("spawn supervisor");

        let result = supervisor
            .eval("sleep 999", Some(Duration::from_millis(300)))
            .await;

        assert!(matches!(result, Err(EvalError::ExecutionTimeout)));
        supervisor.stop().await;
    }
}
