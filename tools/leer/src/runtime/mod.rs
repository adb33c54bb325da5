use crate::errors::LeerError;
use crate::tui::{render_to_string, render_view, ViewFrame};
use chrono::{DateTime, Local, TimeDelta};
use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, IsTerminal, PipeReader, Stdout};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

const TAB_STOP: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, wakeup) = &*self.inner;
        *lock(flag) = true;
        wakeup.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *lock(&self.inner.0)
    }

    // True when cancelled before the deadline.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let (flag, wakeup) = &*self.inner;
        let mut cancelled = lock(flag);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = wakeup
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
        true
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn wall_time(&self) -> DateTime<Local>;
    fn sleep_until(&self, deadline: Instant, cancel: &CancelToken);
}

pub trait ProcessRunner: Send + Sync {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, LeerError>;
    fn read_line(&self, handle: u64) -> Result<Option<String>, LeerError>;
    fn wait(&self, handle: u64) -> Result<i32, LeerError>;
    fn kill(&self, handle: u64) -> Result<(), LeerError>;
    fn kill_all(&self);

    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, LeerError> {
        let handle = self.spawn(request)?;
        let mut lines = Vec::new();
        loop {
            match self.read_line(handle) {
                Ok(Some(line)) => lines.push(line),
                Ok(None) => break,
                Err(err) => {
                    let _ = self.kill(handle);
                    let _ = self.wait(handle);
                    return Err(err);
                }
            }
        }
        let exit_code = self.wait(handle)?;
        Ok(ProcessOutput { exit_code, lines })
    }
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, LeerError>;
}

pub trait Terminal {
    fn size(&self) -> Result<(u16, u16), LeerError>;
    fn resize(&mut self, width: u16, height: u16) -> Result<(), LeerError>;
    fn draw(&mut self, view: &ViewFrame) -> Result<(), LeerError>;
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep_until(&self, deadline: Instant, cancel: &CancelToken) {
        let _ = cancel.wait_until(deadline);
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, LeerError> {
        std::fs::read_to_string(path)
            .map_err(|e| LeerError::Io(format!("{}: {e}", path.display())))
    }
}

struct ChildEntry {
    pgid: i32,
    // None while wait() has the child; the entry stays so kills still land.
    child: Option<std::process::Child>,
    reader: Option<BufReader<PipeReader>>,
}

#[derive(Default)]
struct ProcessState {
    next_handle: u64,
    children: HashMap<u64, ChildEntry>,
}

pub struct ProductionProcessRunner {
    state: Mutex<ProcessState>,
}

impl ProductionProcessRunner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProcessState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ProcessState> {
        lock(&self.state)
    }
}

impl Default for ProductionProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for ProductionProcessRunner {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, LeerError> {
        let (reader, writer) = std::io::pipe().map_err(|e| LeerError::Io(e.to_string()))?;
        let stderr_writer = writer
            .try_clone()
            .map_err(|e| LeerError::Io(e.to_string()))?;

        // The Command holds the parent's copies of the write end; it must be
        // dropped before reading or EOF never arrives.
        let mut child = std::process::Command::new(&request.program)
            .args(&request.args)
            .stdin(std::process::Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            .process_group(0)
            .spawn()
            .map_err(|e| LeerError::Process(format!("{}: {e}", request.program)))?;

        let pgid = match i32::try_from(child.id()) {
            Ok(pgid) => pgid,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(LeerError::Process(e.to_string()));
            }
        };

        let mut state = self.state();
        let handle = state.next_handle;
        state.next_handle += 1;
        state.children.insert(
            handle,
            ChildEntry {
                pgid,
                child: Some(child),
                reader: Some(BufReader::new(reader)),
            },
        );
        Ok(handle)
    }

    fn read_line(&self, handle: u64) -> Result<Option<String>, LeerError> {
        // Read without holding the lock so kill() can reach the child.
        let mut reader = self
            .state()
            .children
            .get_mut(&handle)
            .ok_or_else(|| LeerError::Process(format!("unknown handle {handle}")))?
            .reader
            .take()
            .ok_or_else(|| LeerError::Process(format!("output of handle {handle} is busy")))?;

        let mut buf = Vec::new();
        let result = reader.read_until(b'\n', &mut buf);

        if let Some(entry) = self.state().children.get_mut(&handle) {
            entry.reader = Some(reader);
        }

        let read = result.map_err(|e| LeerError::Io(e.to_string()))?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(decode_output_line(&buf)))
    }

    fn wait(&self, handle: u64) -> Result<i32, LeerError> {
        // Block without the lock, but leave the entry registered so kill()
        // and kill_all() still reach a child that closed its output early.
        let mut child = {
            let mut state = self.state();
            let entry = state
                .children
                .get_mut(&handle)
                .ok_or_else(|| LeerError::Process(format!("unknown handle {handle}")))?;
            drop(entry.reader.take());
            entry
                .child
                .take()
                .ok_or_else(|| LeerError::Process(format!("handle {handle} is already waited on")))?
        };

        let result = child.wait();
        self.state().children.remove(&handle);
        let status = result.map_err(|e| LeerError::Process(e.to_string()))?;
        Ok(status
            .code()
            .unwrap_or_else(|| status.signal().map(|signal| 128 + signal).unwrap_or(-1)))
    }

    fn kill(&self, handle: u64) -> Result<(), LeerError> {
        let mut state = self.state();
        let entry = state
            .children
            .get_mut(&handle)
            .ok_or_else(|| LeerError::Process(format!("unknown handle {handle}")))?;
        kill_process_group(entry)
    }

    fn kill_all(&self) {
        let mut state = self.state();
        for entry in state.children.values_mut() {
            let _ = kill_process_group(entry);
        }
    }
}

// Children run in their own process group, so grandchildren that still
// hold the output pipe go down with the shell.
fn kill_process_group(entry: &mut ChildEntry) -> Result<(), LeerError> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(entry.pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => match entry.child.as_mut() {
            Some(child) => child
                .kill()
                .map_err(|e| LeerError::Process(e.to_string())),
            None => Err(LeerError::Process(err.to_string())),
        },
    }
}

pub fn decode_output_line(raw: &[u8]) -> String {
    let mut bytes = raw;
    if let Some(rest) = bytes.strip_suffix(b"\n") {
        bytes = rest;
    }
    if let Some(rest) = bytes.strip_suffix(b"\r") {
        bytes = rest;
    }
    let text = String::from_utf8_lossy(bytes);
    if !text.contains('\t') {
        return text.into_owned();
    }

    let mut out = String::with_capacity(text.len() + TAB_STOP);
    let mut column = 0usize;
    for ch in text.chars() {
        if ch == '\t' {
            let pad = TAB_STOP - column % TAB_STOP;
            out.extend(std::iter::repeat(' ').take(pad));
            column += pad;
        } else {
            out.push(ch);
            column += 1;
        }
    }
    out
}

type RatatuiTerminal = ratatui::Terminal<CrosstermBackend<Stdout>>;

pub struct ProductionTerminal {
    inner: RatatuiTerminal,
}

impl ProductionTerminal {
    pub fn enter() -> Result<Self, LeerError> {
        let mut stdout = std::io::stdout();
        if !stdout.is_terminal() {
            return Err(LeerError::Terminal(
                "leer requires an interactive terminal on stdout".to_string(),
            ));
        }
        enable_raw_mode().map_err(|e| LeerError::Terminal(e.to_string()))?;
        if let Err(err) = execute!(stdout, EnterAlternateScreen, Hide) {
            let _ = disable_raw_mode();
            return Err(LeerError::Terminal(err.to_string()));
        }

        let inner = match RatatuiTerminal::new(CrosstermBackend::new(stdout)) {
            Ok(inner) => inner,
            Err(err) => {
                let _ = disable_raw_mode();
                let _ = execute!(std::io::stdout(), LeaveAlternateScreen, Show);
                return Err(LeerError::Terminal(err.to_string()));
            }
        };
        // From here on Drop restores the screen, even on early return.
        let mut terminal = Self { inner };
        terminal
            .inner
            .clear()
            .map_err(|e| LeerError::Terminal(e.to_string()))?;
        Ok(terminal)
    }
}

impl Drop for ProductionTerminal {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.inner.backend_mut(), LeaveAlternateScreen, Show);
    }
}

impl Terminal for ProductionTerminal {
    fn size(&self) -> Result<(u16, u16), LeerError> {
        crossterm::terminal::size().map_err(|e| LeerError::Terminal(e.to_string()))
    }

    fn resize(&mut self, width: u16, height: u16) -> Result<(), LeerError> {
        self.inner
            .resize(Rect::new(0, 0, width, height))
            .map_err(|e| LeerError::Terminal(e.to_string()))
    }

    fn draw(&mut self, view: &ViewFrame) -> Result<(), LeerError> {
        self.inner
            .draw(|frame| render_view(frame, view))
            .map(|_| ())
            .map_err(|e| LeerError::Terminal(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub clock: Arc<dyn Clock>,
    pub file_system: Arc<dyn FileSystem>,
    pub process_runner: Arc<dyn ProcessRunner>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ProductionClock),
            file_system: Arc::new(ProductionFileSystem),
            process_runner: Arc::new(ProductionProcessRunner::new()),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct FakeClock {
    origin: Instant,
    wall_origin: DateTime<Local>,
    offset: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Instant>>>,
}

impl FakeClock {
    pub fn new(wall_origin: DateTime<Local>) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin,
            offset: Arc::new(Mutex::new(Duration::ZERO)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }

    pub fn sleeps(&self) -> Vec<Instant> {
        lock(&self.sleeps).clone()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(DateTime::<Local>::from(SystemTime::UNIX_EPOCH))
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.origin + *lock(&self.offset)
    }

    fn wall_time(&self) -> DateTime<Local> {
        let offset = TimeDelta::from_std(*lock(&self.offset)).unwrap_or(TimeDelta::zero());
        self.wall_origin + offset
    }

    fn sleep_until(&self, deadline: Instant, _cancel: &CancelToken) {
        lock(&self.sleeps).push(deadline);
        let target = deadline.saturating_duration_since(self.origin);
        let mut offset = lock(&self.offset);
        if target > *offset {
            *offset = target;
        }
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        lock(&fs.files).insert(path.into(), contents.into());
        fs
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, LeerError> {
        lock(&self.files)
            .get(path)
            .cloned()
            .ok_or_else(|| LeerError::Io(format!("missing file {}", path.display())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeRun {
    Output { lines: Vec<String>, exit_code: i32 },
    SpawnError(String),
}

#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    scripts: Arc<Mutex<VecDeque<FakeRun>>>,
    running: Arc<Mutex<HashMap<u64, (VecDeque<String>, i32)>>>,
    spawned: Arc<Mutex<Vec<ProcessRequest>>>,
    kills: Arc<Mutex<Vec<u64>>>,
    next_handle: Arc<Mutex<u64>>,
}

impl FakeProcessRunner {
    pub fn push_run(&self, run: FakeRun) {
        lock(&self.scripts).push_back(run);
    }

    pub fn push_output(&self, lines: &[&str], exit_code: i32) {
        self.push_run(FakeRun::Output {
            lines: lines.iter().map(|line| line.to_string()).collect(),
            exit_code,
        });
    }

    pub fn spawned(&self) -> Vec<ProcessRequest> {
        lock(&self.spawned).clone()
    }

    pub fn kills(&self) -> Vec<u64> {
        lock(&self.kills).clone()
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, LeerError> {
        lock(&self.spawned).push(request);
        let script = lock(&self.scripts)
            .pop_front()
            .ok_or_else(|| LeerError::Process("no fake run queued".to_string()))?;
        match script {
            FakeRun::SpawnError(message) => Err(LeerError::Process(message)),
            FakeRun::Output { lines, exit_code } => {
                let mut next = lock(&self.next_handle);
                let handle = *next;
                *next += 1;
                lock(&self.running).insert(handle, (lines.into(), exit_code));
                Ok(handle)
            }
        }
    }

    fn read_line(&self, handle: u64) -> Result<Option<String>, LeerError> {
        let mut running = lock(&self.running);
        let (lines, _) = running
            .get_mut(&handle)
            .ok_or_else(|| LeerError::Process(format!("unknown handle {handle}")))?;
        Ok(lines.pop_front())
    }

    fn wait(&self, handle: u64) -> Result<i32, LeerError> {
        lock(&self.running)
            .remove(&handle)
            .map(|(_, exit_code)| exit_code)
            .ok_or_else(|| LeerError::Process(format!("unknown handle {handle}")))
    }

    fn kill(&self, handle: u64) -> Result<(), LeerError> {
        lock(&self.kills).push(handle);
        if let Some((lines, exit_code)) = lock(&self.running).get_mut(&handle) {
            lines.clear();
            *exit_code = 137;
        }
        Ok(())
    }

    fn kill_all(&self) {
        let handles = lock(&self.running).keys().copied().collect::<Vec<_>>();
        for handle in handles {
            let _ = self.kill(handle);
        }
    }
}

#[derive(Clone)]
pub struct FakeTerminal {
    size: Arc<Mutex<(u16, u16)>>,
    frames: Arc<Mutex<Vec<String>>>,
    resizes: Arc<Mutex<Vec<(u16, u16)>>>,
    fail_next_draw: Arc<Mutex<Option<LeerError>>>,
}

impl FakeTerminal {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            size: Arc::new(Mutex::new((width, height))),
            frames: Arc::new(Mutex::new(Vec::new())),
            resizes: Arc::new(Mutex::new(Vec::new())),
            fail_next_draw: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_size(&self, width: u16, height: u16) {
        *lock(&self.size) = (width, height);
    }

    pub fn set_fail_next_draw(&self, error: LeerError) {
        *lock(&self.fail_next_draw) = Some(error);
    }

    pub fn drawn_frames(&self) -> Vec<String> {
        lock(&self.frames).clone()
    }

    pub fn last_frame(&self) -> Option<String> {
        lock(&self.frames).last().cloned()
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        lock(&self.resizes).clone()
    }
}

impl Terminal for FakeTerminal {
    fn size(&self) -> Result<(u16, u16), LeerError> {
        Ok(*lock(&self.size))
    }

    fn resize(&mut self, width: u16, height: u16) -> Result<(), LeerError> {
        lock(&self.resizes).push((width, height));
        Ok(())
    }

    fn draw(&mut self, view: &ViewFrame) -> Result<(), LeerError> {
        if let Some(err) = lock(&self.fail_next_draw).take() {
            return Err(err);
        }
        let (width, height) = *lock(&self.size);
        let frame = render_to_string(view, width, height);
        lock(&self.frames).push(frame);
        Ok(())
    }
}
