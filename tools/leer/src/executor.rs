use crate::events::WakeSignal;
use crate::logging::{log_event, JsonlLogger};
use crate::runtime::{CancelToken, Clock, ProcessRequest, ProcessRunner};
use crate::transcript::{RunStamp, SharedTranscript};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Exit status recorded for a run whose command could not be started.
pub const SPAWN_FAILURE_STATUS: i32 = 127;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub shell: String,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>, shell: impl Into<String>) -> Self {
        Self {
            argv,
            shell: shell.into(),
        }
    }

    /// The command as the shell sees it: arguments joined by single spaces.
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    pub fn request(&self) -> ProcessRequest {
        ProcessRequest {
            program: self.shell.clone(),
            args: vec!["-c".to_string(), self.command_line()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { exit_status: i32 },
    Cancelled,
}

/// Target start of iteration `iteration`: `start + interval * iteration`.
///
/// Depends only on the fixed reference, so a slow run delays its successor
/// but never shifts the rest of the schedule.
pub fn scheduled_start(start: Instant, interval: Duration, iteration: u64) -> Instant {
    let total = interval.as_nanos().saturating_mul(u128::from(iteration));
    let secs = u64::try_from(total / 1_000_000_000).unwrap_or(u64::MAX);
    let nanos = (total % 1_000_000_000) as u32;
    start.checked_add(Duration::new(secs, nanos)).unwrap_or(start)
}

pub struct ExecutionLoop {
    command: CommandSpec,
    interval: Duration,
    runner: Arc<dyn ProcessRunner>,
    clock: Arc<dyn Clock>,
    transcript: SharedTranscript,
    wake: WakeSignal,
    cancel: CancelToken,
    logger: Option<JsonlLogger>,
}

impl ExecutionLoop {
    pub fn new(
        command: CommandSpec,
        interval: Duration,
        runner: Arc<dyn ProcessRunner>,
        clock: Arc<dyn Clock>,
        transcript: SharedTranscript,
        wake: WakeSignal,
        cancel: CancelToken,
    ) -> Self {
        Self {
            command,
            interval,
            runner,
            clock,
            transcript,
            wake,
            cancel,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Option<JsonlLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Runs iterations until the cancel token fires.
    pub fn run(&self) {
        let start = self.clock.now();
        let mut iteration = 0u64;
        while !self.cancel.is_cancelled() {
            if self.run_iteration(start, iteration) == RunOutcome::Cancelled {
                break;
            }
            iteration = iteration.saturating_add(1);
        }
    }

    pub fn run_iteration(&self, start: Instant, iteration: u64) -> RunOutcome {
        let target = scheduled_start(start, self.interval, iteration);
        self.clock.sleep_until(target, &self.cancel);
        if self.cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        let stamp = RunStamp {
            index: iteration,
            started_at: self.clock.now(),
            started_wall: self.clock.wall_time(),
        };
        self.transcript.begin_run(stamp);
        self.wake.notify();
        log_event(
            self.logger.as_ref(),
            "info",
            "run_started",
            json!({"run": iteration, "command": self.command.command_line()}),
        );

        let handle = match self.runner.spawn(self.command.request()) {
            Ok(handle) => handle,
            Err(err) => {
                log_event(
                    self.logger.as_ref(),
                    "warn",
                    "spawn_failed",
                    json!({"run": iteration, "error": err.to_string()}),
                );
                self.transcript.append_line(format!(
                    "leer: cannot run `{}`: {err}",
                    self.command.command_line()
                ));
                return self.finish(iteration, stamp, SPAWN_FAILURE_STATUS);
            }
        };

        loop {
            if self.cancel.is_cancelled() {
                let _ = self.runner.kill(handle);
                let _ = self.runner.wait(handle);
                return RunOutcome::Cancelled;
            }
            match self.runner.read_line(handle) {
                Ok(Some(line)) => {
                    self.transcript.append_line(line);
                    self.wake.notify();
                }
                Ok(None) => break,
                Err(err) => {
                    log_event(
                        self.logger.as_ref(),
                        "warn",
                        "read_failed",
                        json!({"run": iteration, "error": err.to_string()}),
                    );
                    self.transcript
                        .append_line(format!("leer: reading output failed: {err}"));
                    let _ = self.runner.kill(handle);
                    break;
                }
            }
        }

        let exit_status = match self.runner.wait(handle) {
            Ok(status) => status,
            Err(err) => {
                self.transcript
                    .append_line(format!("leer: waiting for command failed: {err}"));
                SPAWN_FAILURE_STATUS
            }
        };
        if self.cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }
        self.finish(iteration, stamp, exit_status)
    }

    fn finish(&self, iteration: u64, stamp: RunStamp, exit_status: i32) -> RunOutcome {
        let finished_at = self.clock.now();
        self.transcript.finish_run(exit_status, finished_at);
        self.wake.notify();
        log_event(
            self.logger.as_ref(),
            "info",
            "run_finished",
            json!({
                "run": iteration,
                "exit_status": exit_status,
                "lines": self.transcript.len(),
                "elapsed_ms": finished_at.saturating_duration_since(stamp.started_at).as_millis() as u64,
            }),
        );
        RunOutcome::Completed { exit_status }
    }
}
