use crate::errors::LeerError;
use crate::events::{EventReceiver, UiEvent, WakeSignal};
use crate::hotkeys::{action_for_key, HotkeyAction};
use crate::logging::{log_event, JsonlLogger};
use crate::runtime::Terminal;
use crate::transcript::SharedTranscript;
use crate::tui::{build_view, viewport_height};
use crate::viewport::ScrollState;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Interrupted,
    Terminated,
    InputClosed,
    ChannelClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(ExitReason),
}

/// The render loop. Owns the terminal and the scroll position; reads the
/// shared transcript only through per-frame snapshots.
pub struct Viewer<T: Terminal> {
    terminal: T,
    transcript: SharedTranscript,
    wake: WakeSignal,
    scroll: ScrollState,
    header: String,
    hostname: String,
    line_numbers: bool,
    size: (u16, u16),
    logger: Option<JsonlLogger>,
}

impl<T: Terminal> Viewer<T> {
    pub fn new(
        terminal: T,
        transcript: SharedTranscript,
        wake: WakeSignal,
        header: impl Into<String>,
        hostname: impl Into<String>,
        line_numbers: bool,
    ) -> Result<Self, LeerError> {
        let size = terminal.size()?;
        Ok(Self {
            terminal,
            transcript,
            wake,
            scroll: ScrollState::new(),
            header: header.into(),
            hostname: hostname.into(),
            line_numbers,
            size,
            logger: None,
        })
    }

    pub fn with_logger(mut self, logger: Option<JsonlLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn first_line_shown(&self) -> usize {
        self.scroll.first_line_shown()
    }

    pub fn size(&self) -> (u16, u16) {
        self.size
    }

    /// Draws, then blocks on the event channel until the session should end.
    /// Events that piled up while drawing are handled as one batch.
    pub fn run(&mut self, events: &mut EventReceiver) -> ExitReason {
        self.draw();
        while let Some(event) = events.recv() {
            let mut flow = self.handle_event(event);
            while flow == Flow::Continue {
                match events.try_recv() {
                    Some(next) => flow = self.handle_event(next),
                    None => break,
                }
            }
            if let Flow::Exit(reason) = flow {
                return reason;
            }
            self.draw();
        }
        ExitReason::ChannelClosed
    }

    pub fn handle_event(&mut self, event: UiEvent) -> Flow {
        match event {
            UiEvent::Wake => {
                self.wake.acknowledge();
                Flow::Continue
            }
            UiEvent::Key(key) => match action_for_key(&key) {
                Some(HotkeyAction::Interrupt) => Flow::Exit(ExitReason::Interrupted),
                Some(HotkeyAction::Scroll(action)) => {
                    let height = viewport_height(self.size.1);
                    self.scroll.apply(action, self.transcript.len(), height);
                    Flow::Continue
                }
                None => Flow::Continue,
            },
            UiEvent::Resize(width, height) => {
                let size = self.terminal.size().unwrap_or((width, height));
                if size != self.size {
                    if let Err(err) = self.terminal.resize(size.0, size.1) {
                        log_event(
                            self.logger.as_ref(),
                            "warn",
                            "resize_failed",
                            json!({"error": err.to_string()}),
                        );
                    }
                    log_event(
                        self.logger.as_ref(),
                        "info",
                        "terminal_resized",
                        json!({"width": size.0, "height": size.1}),
                    );
                    self.size = size;
                }
                Flow::Continue
            }
            UiEvent::Terminate => Flow::Exit(ExitReason::Terminated),
            UiEvent::InputClosed => Flow::Exit(ExitReason::InputClosed),
        }
    }

    /// Snapshots the transcript once and draws it. A failed draw is logged and
    /// the next one tries again.
    pub fn draw(&mut self) {
        let height = viewport_height(self.size.1);
        let snapshot = self
            .transcript
            .snapshot(self.scroll.first_line_shown(), height);
        self.scroll.clamp(snapshot.total_lines, height);
        let view = build_view(&self.header, &self.hostname, self.line_numbers, &snapshot);
        if let Err(err) = self.terminal.draw(&view) {
            log_event(
                self.logger.as_ref(),
                "warn",
                "draw_failed",
                json!({"error": err.to_string()}),
            );
        }
    }
}
