//! Scroll model for the transcript viewport.
//!
//! Everything here is pure: the render loop feeds in the buffer length and the
//! usable screen height, and gets back a clamped offset or a line range.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    LineDown,
    LineUp,
    PageDown,
    PageUp,
    Top,
    Bottom,
}

/// Largest valid `first_line_shown` for a buffer of `len` lines.
pub fn max_first_line(len: usize, height: usize) -> usize {
    len.saturating_sub(height)
}

pub fn clamp_first_line(first_line_shown: usize, len: usize, height: usize) -> usize {
    first_line_shown.min(max_first_line(len, height))
}

/// Half-open range of transcript indices to draw.
///
/// The offset is clamped first, so callers may pass a stale offset (for
/// example the raw buffer length stored by "go to bottom").
pub fn visible_range(len: usize, first_line_shown: usize, height: usize) -> Range<usize> {
    let start = clamp_first_line(first_line_shown, len, height);
    let end = start.saturating_add(height).min(len);
    start..end
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollState {
    first_line_shown: usize,
}

impl ScrollState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first_line_shown(&self) -> usize {
        self.first_line_shown
    }

    pub fn apply(&mut self, action: ScrollAction, len: usize, height: usize) {
        let page = height.max(1);
        self.first_line_shown = match action {
            ScrollAction::LineDown => self.first_line_shown.saturating_add(1),
            ScrollAction::LineUp => self.first_line_shown.saturating_sub(1),
            ScrollAction::PageDown => self.first_line_shown.saturating_add(page),
            ScrollAction::PageUp => self.first_line_shown.saturating_sub(page),
            ScrollAction::Top => 0,
            ScrollAction::Bottom => len,
        };
        self.clamp(len, height);
    }

    /// Runs every frame: the buffer can shrink (new run) or grow between frames.
    pub fn clamp(&mut self, len: usize, height: usize) {
        self.first_line_shown = clamp_first_line(self.first_line_shown, len, height);
    }
}

#[cfg(test)]
mod tests {
    use super::{clamp_first_line, max_first_line, visible_range, ScrollAction, ScrollState};

    #[test]
    fn visible_range_stays_inside_buffer_and_viewport() {
        for len in 0..40 {
            for height in 1..15 {
                for first in 0..60 {
                    let range = visible_range(len, first, height);
                    assert!(range.start <= range.end, "len={len} h={height} first={first}");
                    assert!(range.end <= len);
                    assert!(range.end - range.start <= height);
                }
            }
        }
    }

    #[test]
    fn clamp_is_idempotent() {
        for len in 0..30 {
            for height in 0..12 {
                for first in 0..50 {
                    let once = clamp_first_line(first, len, height);
                    assert_eq!(clamp_first_line(once, len, height), once);
                }
            }
        }
    }

    #[test]
    fn full_page_is_shown_when_buffer_is_long_enough() {
        assert_eq!(visible_range(100, 95, 10), 90..100);
        assert_eq!(visible_range(100, 0, 10), 0..10);
        assert_eq!(visible_range(5, 3, 10), 0..5);
        assert_eq!(visible_range(0, 7, 10), 0..0);
        assert_eq!(max_first_line(3, 10), 0);
    }

    #[test]
    fn bottom_then_page_up_lands_one_page_above_last_page() {
        let mut scroll = ScrollState::new();
        scroll.apply(ScrollAction::Bottom, 100, 10);
        assert_eq!(scroll.first_line_shown(), 90);
        scroll.apply(ScrollAction::PageUp, 100, 10);
        assert_eq!(scroll.first_line_shown(), 80);
    }

    #[test]
    fn line_moves_saturate_at_both_ends() {
        let mut scroll = ScrollState::new();
        scroll.apply(ScrollAction::LineUp, 20, 10);
        assert_eq!(scroll.first_line_shown(), 0);
        for _ in 0..15 {
            scroll.apply(ScrollAction::LineDown, 20, 10);
        }
        assert_eq!(scroll.first_line_shown(), 10);
        scroll.apply(ScrollAction::PageUp, 20, 10);
        scroll.apply(ScrollAction::PageUp, 20, 10);
        assert_eq!(scroll.first_line_shown(), 0);
        scroll.apply(ScrollAction::PageDown, 20, 10);
        assert_eq!(scroll.first_line_shown(), 10);
        scroll.apply(ScrollAction::Top, 20, 10);
        assert_eq!(scroll.first_line_shown(), 0);
    }

    #[test]
    fn shrinking_buffer_pulls_offset_back() {
        let mut scroll = ScrollState::new();
        scroll.apply(ScrollAction::Bottom, 50, 10);
        assert_eq!(scroll.first_line_shown(), 40);
        scroll.clamp(0, 10);
        assert_eq!(scroll.first_line_shown(), 0);
    }
}
