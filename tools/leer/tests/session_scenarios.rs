use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use leer::config::AppConfig;
use leer::events::{event_channel, UiEvent};
use leer::executor::CommandSpec;
use leer::runtime::{FakeTerminal, ProductionRuntime};
use leer::session::run_session;
use leer::viewer::ExitReason;
use std::time::{Duration, Instant};

fn config(interval_seconds: f64) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.schedule.interval_seconds = interval_seconds;
    cfg
}

/// Runs a session against a fake terminal and presses Ctrl-C once a drawn
/// frame satisfies `ready` (or after ten seconds). Returns the exit reason,
/// the matching frame, and how long shutdown took after the key press.
fn run_until<F>(
    cfg: &AppConfig,
    script: &str,
    terminal: &FakeTerminal,
    ready: F,
) -> (ExitReason, String, Duration)
where
    F: Fn(&str) -> bool + Send + 'static,
{
    let (sender, events) = event_channel();
    let watcher_sender = sender.clone();
    let watcher_terminal = terminal.clone();
    let watcher = std::thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut matched = String::new();
        while Instant::now() < deadline {
            if let Some(frame) = watcher_terminal.last_frame().filter(|frame| ready(frame)) {
                matched = frame;
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        let pressed = Instant::now();
        watcher_sender.send(UiEvent::Key(KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL,
        )));
        (pressed, matched)
    });

    let command = CommandSpec::new(vec![script.to_string()], cfg.execution.shell.clone());
    let reason = run_session(
        cfg,
        command,
        "testhost",
        &ProductionRuntime::new(),
        terminal.clone(),
        sender,
        events,
    )
    .expect("session");
    let (pressed, frame) = watcher.join().expect("watcher");
    (reason, frame, pressed.elapsed())
}

fn body(frame: &str) -> Vec<&str> {
    frame.lines().skip(2).filter(|row| !row.is_empty()).collect()
}

#[test]
fn three_lines_are_shown_after_the_first_run() {
    let terminal = FakeTerminal::new(60, 10);
    let (reason, frame, _) = run_until(
        &config(2.0),
        "printf 'a\\nb\\nc\\n'",
        &terminal,
        |frame| frame.contains("[exit 0 in"),
    );
    assert_eq!(reason, ExitReason::Interrupted);
    assert!(frame.starts_with("Every 2s: printf"));
    assert!(frame.contains("testhost: "));
    assert_eq!(body(&frame), vec!["a", "b", "c"]);
}

#[test]
fn silent_failure_shows_an_empty_body_and_the_status() {
    let terminal = FakeTerminal::new(60, 10);
    let (_, frame, _) = run_until(&config(2.0), "exit 1", &terminal, |frame| {
        frame.contains("[exit 1 in")
    });
    assert!(frame.contains("[exit 1 in"));
    assert!(body(&frame).is_empty());
}

#[test]
fn stderr_is_interleaved_with_stdout() {
    let terminal = FakeTerminal::new(60, 10);
    let (_, frame, _) = run_until(
        &config(2.0),
        "echo out; echo err 1>&2; echo again",
        &terminal,
        |frame| frame.contains("[exit 0 in"),
    );
    assert_eq!(body(&frame), vec!["out", "err", "again"]);
}

#[test]
fn each_run_replaces_the_previous_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let counter = dir.path().join("count");
    let script = format!(
        "echo run >> {path}; wc -l < {path} | tr -d ' '",
        path = counter.display()
    );
    let terminal = FakeTerminal::new(60, 10);
    let (_, frame, _) = run_until(&config(0.1), &script, &terminal, |frame| {
        frame.lines().skip(2).any(|row| row == "3")
    });
    let rows = body(&frame);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].parse::<u32>().expect("count") >= 3);
}

#[test]
fn ctrl_c_during_a_long_run_returns_promptly() {
    let terminal = FakeTerminal::new(60, 10);
    let (reason, _, shutdown) = run_until(&config(1.0), "sleep 30", &terminal, |frame| {
        frame.contains("[running]")
    });
    assert_eq!(reason, ExitReason::Interrupted);
    assert!(shutdown < Duration::from_secs(5));
}

#[test]
fn ctrl_c_after_the_command_closed_its_output_returns_promptly() {
    let terminal = FakeTerminal::new(60, 10);
    let (reason, _, shutdown) = run_until(
        &config(1.0),
        "exec >/dev/null 2>&1; sleep 30",
        &terminal,
        |frame| {
            // Give the executor time to reach the exit-status wait.
            frame.contains("[running]") && {
                std::thread::sleep(Duration::from_millis(200));
                true
            }
        },
    );
    assert_eq!(reason, ExitReason::Interrupted);
    assert!(shutdown < Duration::from_secs(5));
}

#[test]
fn unstartable_shell_reports_a_synthetic_failure() {
    let mut cfg = config(5.0);
    cfg.execution.shell = "/nonexistent/leer-shell".to_string();
    let terminal = FakeTerminal::new(100, 10);
    let (_, frame, _) = run_until(&cfg, "date", &terminal, |frame| {
        frame.contains("[exit 127 in")
    });
    let rows = body(&frame);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].starts_with("leer: cannot run `date`"));
}

#[test]
fn line_numbers_are_drawn_when_enabled() {
    let mut cfg = config(2.0);
    cfg.display.line_numbers = true;
    let terminal = FakeTerminal::new(60, 10);
    let (_, frame, _) = run_until(&cfg, "seq 3", &terminal, |frame| {
        frame.contains("[exit 0 in")
    });
    assert_eq!(body(&frame), vec!["1 1", "2 2", "3 3"]);
}

#[test]
fn session_events_are_written_to_the_log_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cfg = config(2.0);
    cfg.logging.path = Some(dir.path().join("leer.jsonl"));
    let terminal = FakeTerminal::new(60, 10);
    run_until(&cfg, "true", &terminal, |frame| frame.contains("[exit 0 in"));

    let log = std::fs::read_to_string(dir.path().join("leer.jsonl")).expect("read log");
    assert!(log.contains("\"session_started\""));
    assert!(log.contains("\"run_finished\""));
    assert!(log.contains("\"session_stopped\""));
}
