use crate::errors::LeerError;
use crossterm::event::{Event, KeyEvent, KeyEventKind};
use nix::sys::signal::{SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    Wake,
    Key(KeyEvent),
    Resize(u16, u16),
    InputClosed,
    Terminate,
}

#[derive(Debug, Clone)]
pub struct EventSender {
    tx: UnboundedSender<UiEvent>,
}

impl EventSender {
    pub fn send(&self, event: UiEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[derive(Debug)]
pub struct EventReceiver {
    rx: UnboundedReceiver<UiEvent>,
}

impl EventReceiver {
    pub fn recv(&mut self) -> Option<UiEvent> {
        self.rx.blocking_recv()
    }

    pub fn try_recv(&mut self) -> Option<UiEvent> {
        self.rx.try_recv().ok()
    }
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

// At most one Wake is queued; the viewer acknowledges before it snapshots.
#[derive(Debug, Clone)]
pub struct WakeSignal {
    sender: EventSender,
    pending: Arc<AtomicBool>,
}

impl WakeSignal {
    pub fn new(sender: EventSender) -> Self {
        Self {
            sender,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn notify(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) && !self.sender.send(UiEvent::Wake) {
            self.pending.store(false, Ordering::Release);
        }
    }

    pub fn acknowledge(&self) {
        self.pending.store(false, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

pub fn translate_terminal_event(event: Event) -> Option<UiEvent> {
    match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => Some(UiEvent::Key(key)),
        Event::Resize(width, height) => Some(UiEvent::Resize(width, height)),
        _ => None,
    }
}

pub fn spawn_input_pump(sender: EventSender) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("leer-input".to_string())
        .spawn(move || loop {
            match crossterm::event::read() {
                Ok(event) => {
                    if let Some(ui_event) = translate_terminal_event(event) {
                        if !sender.send(ui_event) {
                            return;
                        }
                    }
                }
                Err(_) => {
                    let _ = sender.send(UiEvent::InputClosed);
                    return;
                }
            }
        })
}

/// Must run before any other thread starts: later threads inherit the mask
/// that keeps SIGINT, SIGTERM and SIGHUP on the listener.
pub fn spawn_signal_listener(
    sender: EventSender,
) -> Result<std::thread::JoinHandle<()>, LeerError> {
    let mut signals = SigSet::empty();
    for signal in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        signals.add(signal);
    }
    signals
        .thread_block()
        .map_err(|e| LeerError::Io(format!("blocking signals: {e}")))?;
    std::thread::Builder::new()
        .name("leer-signals".to_string())
        .spawn(move || {
            while signals.wait().is_ok() {
                if !sender.send(UiEvent::Terminate) {
                    return;
                }
            }
        })
        .map_err(|e| LeerError::Io(e.to_string()))
}
