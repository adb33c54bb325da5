use crate::highlight::changed_columns;
use crate::transcript::{RunPhase, TranscriptSnapshot};
use ratatui::backend::TestBackend;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::{Frame, Terminal};
use std::ops::Range;
use std::time::Duration;

/// Rows above the transcript: the header and the status line.
pub const CHROME_ROWS: u16 = 2;
pub const START_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyLine {
    /// 1-based transcript index, when line numbers are on.
    pub number: Option<usize>,
    pub text: String,
    /// Changed character columns; `None` when differences are off or there
    /// is no comparison run yet.
    pub highlights: Option<Vec<Range<usize>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFrame {
    pub header: String,
    pub status: String,
    pub number_width: usize,
    pub body: Vec<BodyLine>,
}

pub fn viewport_height(terminal_height: u16) -> usize {
    usize::from(terminal_height.saturating_sub(CHROME_ROWS))
}

pub fn header_line(interval: Duration, command: &str) -> String {
    format!("Every {}s: {command}", interval.as_secs_f64())
}

pub fn status_line(hostname: &str, snapshot: &TranscriptSnapshot) -> String {
    let started = snapshot
        .run
        .map(|run| run.started_wall.format(START_TIME_FORMAT).to_string())
        .unwrap_or_else(|| "waiting for first run".to_string());
    let phase = match snapshot.phase {
        RunPhase::Idle => String::new(),
        RunPhase::Running => "  [running]".to_string(),
        RunPhase::Finished { elapsed } => format!(
            "  [exit {} in {:.1}s]",
            snapshot.exit_status,
            elapsed.as_secs_f64()
        ),
    };
    format!("{hostname}: {started}{phase}")
}

pub fn build_view(
    header: &str,
    hostname: &str,
    line_numbers: bool,
    snapshot: &TranscriptSnapshot,
) -> ViewFrame {
    let number_width = if line_numbers {
        snapshot.total_lines.max(1).to_string().len()
    } else {
        0
    };
    let body = snapshot
        .lines
        .iter()
        .enumerate()
        .map(|(offset, text)| {
            let highlights = snapshot.baseline.as_ref().map(|baseline| {
                let old = baseline.get(offset).map(String::as_str).unwrap_or("");
                changed_columns(text, old)
            });
            BodyLine {
                number: line_numbers.then_some(snapshot.range.start + offset + 1),
                text: text.clone(),
                highlights,
            }
        })
        .collect();

    ViewFrame {
        header: header.to_string(),
        status: status_line(hostname, snapshot),
        number_width,
        body,
    }
}

/// Draws one frame. Anything that does not fit the area is clipped.
pub fn render_view(frame: &mut Frame<'_>, view: &ViewFrame) {
    let area = frame.area();
    if area.width == 0 || area.height == 0 {
        return;
    }

    let mut lines = Vec::with_capacity(view.body.len() + usize::from(CHROME_ROWS));
    lines.push(Line::from(Span::styled(
        view.header.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(Span::styled(
        view.status.clone(),
        Style::default().fg(Color::DarkGray),
    )));
    lines.extend(
        view.body
            .iter()
            .map(|line| body_line(line, view.number_width)),
    );

    frame.render_widget(Paragraph::new(lines), area);
}

fn body_line(line: &BodyLine, number_width: usize) -> Line<'static> {
    let mut spans = Vec::new();
    if let Some(number) = line.number {
        spans.push(Span::styled(
            format!("{number:>number_width$} "),
            Style::default().fg(Color::Cyan),
        ));
    }
    match &line.highlights {
        Some(ranges) if !ranges.is_empty() => spans.extend(highlighted_spans(&line.text, ranges)),
        _ => spans.push(Span::raw(line.text.clone())),
    }
    Line::from(spans)
}

fn highlighted_spans(text: &str, ranges: &[Range<usize>]) -> Vec<Span<'static>> {
    let chars = text.chars().collect::<Vec<_>>();
    let changed = Style::default().add_modifier(Modifier::REVERSED);
    let mut spans = Vec::new();
    let mut cursor = 0usize;
    for range in ranges {
        let start = range.start.clamp(cursor, chars.len());
        let end = range.end.clamp(start, chars.len());
        if start > cursor {
            spans.push(Span::raw(chars[cursor..start].iter().collect::<String>()));
        }
        if end > start {
            spans.push(Span::styled(
                chars[start..end].iter().collect::<String>(),
                changed,
            ));
        }
        cursor = end;
    }
    if cursor < chars.len() {
        spans.push(Span::raw(chars[cursor..].iter().collect::<String>()));
    }
    spans
}

/// Renders a frame off-screen and returns its rows, trailing blanks trimmed.
pub fn render_to_string(view: &ViewFrame, width: u16, height: u16) -> String {
    if width == 0 || height == 0 {
        return String::new();
    }
    let Ok(mut terminal) = Terminal::new(TestBackend::new(width, height)) else {
        return String::new();
    };
    if terminal.draw(|frame| render_view(frame, view)).is_err() {
        return String::new();
    }

    let buffer = terminal.backend().buffer();
    let mut out = String::new();
    for y in 0..height {
        let mut row = String::new();
        for x in 0..width {
            row.push_str(buffer[(x, y)].symbol());
        }
        out.push_str(row.trim_end());
        out.push('\n');
    }
    out
}
