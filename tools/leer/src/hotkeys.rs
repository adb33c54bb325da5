use crate::viewport::ScrollAction;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub key: &'static str,
    pub action: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    Scroll(ScrollAction),
    Interrupt,
}

pub const NAVIGATION_BINDINGS: [HotkeyBinding; 7] = [
    HotkeyBinding {
        key: "j/Down",
        action: "line down",
    },
    HotkeyBinding {
        key: "k/Up",
        action: "line up",
    },
    HotkeyBinding {
        key: "Space/PgDn",
        action: "page down",
    },
    HotkeyBinding {
        key: "b/PgUp",
        action: "page up",
    },
    HotkeyBinding {
        key: "g/Home",
        action: "top",
    },
    HotkeyBinding {
        key: "G/End",
        action: "bottom",
    },
    HotkeyBinding {
        key: "Ctrl-C",
        action: "exit",
    },
];

pub fn controls_legend() -> String {
    format_bindings("Keys: ", &NAVIGATION_BINDINGS)
}

pub fn action_for_key(event: &KeyEvent) -> Option<HotkeyAction> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    if event.modifiers.contains(KeyModifiers::CONTROL) {
        return match event.code {
            KeyCode::Char('c') | KeyCode::Char('C') => Some(HotkeyAction::Interrupt),
            _ => None,
        };
    }

    let scroll = match event.code {
        KeyCode::Down | KeyCode::Char('j') => ScrollAction::LineDown,
        KeyCode::Up | KeyCode::Char('k') => ScrollAction::LineUp,
        KeyCode::PageDown | KeyCode::Char(' ') => ScrollAction::PageDown,
        KeyCode::PageUp | KeyCode::Char('b') => ScrollAction::PageUp,
        KeyCode::Home | KeyCode::Char('g') => ScrollAction::Top,
        KeyCode::End | KeyCode::Char('G') => ScrollAction::Bottom,
        _ => return None,
    };
    Some(HotkeyAction::Scroll(scroll))
}

fn format_bindings(prefix: &str, bindings: &[HotkeyBinding]) -> String {
    let parts = bindings
        .iter()
        .map(|binding| format!("{} {}", binding.key, binding.action))
        .collect::<Vec<_>>();
    format!("{prefix}{}", parts.join("  "))
}
