use crate::config::AppConfig;
use crate::errors::LeerError;
use crate::events::{EventReceiver, EventSender, WakeSignal};
use crate::executor::{CommandSpec, ExecutionLoop};
use crate::logging::{log_event, JsonlLogger};
use crate::runtime::{CancelToken, ProductionRuntime, Terminal};
use crate::transcript::SharedTranscript;
use crate::tui::header_line;
use crate::viewer::{ExitReason, Viewer};
use serde_json::json;

/// Runs one interactive session: the execution loop on its own thread, the
/// render loop on the caller's. Returns once the viewer exits and the
/// execution thread has been joined.
pub fn run_session<T: Terminal>(
    cfg: &AppConfig,
    command: CommandSpec,
    hostname: &str,
    runtime: &ProductionRuntime,
    terminal: T,
    sender: EventSender,
    mut events: EventReceiver,
) -> Result<ExitReason, LeerError> {
    let logger = JsonlLogger::from_config(&cfg.logging);
    let transcript = SharedTranscript::new(cfg.display.differences);
    let wake = WakeSignal::new(sender);
    let cancel = CancelToken::new();
    let header = header_line(cfg.interval(), &command.command_line());

    let mut viewer = Viewer::new(
        terminal,
        transcript.clone(),
        wake.clone(),
        header,
        hostname,
        cfg.display.line_numbers,
    )?
    .with_logger(logger.clone());

    log_event(
        logger.as_ref(),
        "info",
        "session_started",
        json!({
            "command": command.command_line(),
            "interval_seconds": cfg.schedule.interval_seconds,
            "shell": command.shell,
        }),
    );

    let execution = ExecutionLoop::new(
        command,
        cfg.interval(),
        runtime.process_runner.clone(),
        runtime.clock.clone(),
        transcript,
        wake,
        cancel.clone(),
    )
    .with_logger(logger.clone());
    let handle = std::thread::Builder::new()
        .name("leer-exec".to_string())
        .spawn(move || execution.run())
        .map_err(|e| LeerError::Io(e.to_string()))?;

    let reason = viewer.run(&mut events);

    cancel.cancel();
    runtime.process_runner.kill_all();
    let joined = handle.join();

    log_event(
        logger.as_ref(),
        "info",
        "session_stopped",
        json!({"reason": format!("{reason:?}")}),
    );
    joined.map_err(|_| LeerError::Process("execution loop panicked".to_string()))?;
    Ok(reason)
}
