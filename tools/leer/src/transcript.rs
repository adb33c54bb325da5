use crate::config::DiffMode;
use crate::viewport::visible_range;
use chrono::{DateTime, Local};
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStamp {
    pub index: u64,
    pub started_at: Instant,
    pub started_wall: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Finished { elapsed: Duration },
}

#[derive(Debug)]
struct Transcript {
    lines: Vec<String>,
    baseline: Option<Vec<String>>,
    exit_status: i32,
    run: Option<RunStamp>,
    phase: RunPhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSnapshot {
    pub total_lines: usize,
    pub range: Range<usize>,
    pub lines: Vec<String>,
    // Same-index lines of the comparison run; missing lines are empty.
    pub baseline: Option<Vec<String>>,
    pub exit_status: i32,
    pub run: Option<RunStamp>,
    pub phase: RunPhase,
}

#[derive(Debug, Clone)]
pub struct SharedTranscript {
    inner: Arc<Mutex<Transcript>>,
    diff_mode: DiffMode,
}

impl SharedTranscript {
    pub fn new(diff_mode: DiffMode) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Transcript {
                lines: Vec::new(),
                baseline: None,
                exit_status: 0,
                run: None,
                phase: RunPhase::Idle,
            })),
            diff_mode,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin_run(&self, stamp: RunStamp) {
        let mut state = self.lock();
        let has_previous = state.run.is_some();
        match self.diff_mode {
            DiffMode::Off => state.lines.clear(),
            DiffMode::Previous if has_previous => {
                state.baseline = Some(std::mem::take(&mut state.lines));
            }
            DiffMode::Permanent if has_previous && state.baseline.is_none() => {
                state.baseline = Some(std::mem::take(&mut state.lines));
            }
            DiffMode::Previous | DiffMode::Permanent => state.lines.clear(),
        }
        state.run = Some(stamp);
        state.phase = RunPhase::Running;
    }

    pub fn append_line(&self, line: String) {
        self.lock().lines.push(line);
    }

    pub fn finish_run(&self, exit_status: i32, finished_at: Instant) {
        let mut state = self.lock();
        let elapsed = state
            .run
            .map(|run| finished_at.saturating_duration_since(run.started_at))
            .unwrap_or_default();
        state.exit_status = exit_status;
        state.phase = RunPhase::Finished { elapsed };
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn exit_status(&self) -> i32 {
        self.lock().exit_status
    }

    pub fn phase(&self) -> RunPhase {
        self.lock().phase
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.clone()
    }

    // Reads the line count once.
    pub fn snapshot(&self, first_line_shown: usize, height: usize) -> TranscriptSnapshot {
        let state = self.lock();
        let total_lines = state.lines.len();
        let range = visible_range(total_lines, first_line_shown, height);
        let lines = state.lines[range.clone()].to_vec();
        let baseline = state.baseline.as_ref().map(|baseline| {
            range
                .clone()
                .map(|idx| baseline.get(idx).cloned().unwrap_or_default())
                .collect()
        });
        TranscriptSnapshot {
            total_lines,
            range,
            lines,
            baseline,
            exit_status: state.exit_status,
            run: state.run,
            phase: state.phase,
        }
    }
}
