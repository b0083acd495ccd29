use std::collections::VecDeque;

use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::types::{LogCategory, LogEntry};

pub fn render(f: &mut ratatui::Frame, logs: &VecDeque<LogEntry>, scroll: usize, area: Rect) {
    let title = if scroll == 0 {
        format!(" Log ({}) ", logs.len())
    } else {
        format!(" Log ({}) [scrolled] ", logs.len())
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let (start, end) = window(logs.len(), scroll, inner.height as usize);
    let lines: Vec<Line> = logs
        .range(start..end)
        .map(|entry| {
            Line::from(Span::styled(
                entry.render(),
                Style::default().fg(category_color(entry.category)),
            ))
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

/// Visible slice of the ring: `scroll` lines up from the tail, at most
/// `visible` entries.
fn window(len: usize, scroll: usize, visible: usize) -> (usize, usize) {
    let end = len.saturating_sub(scroll.min(len));
    let start = end.saturating_sub(visible);
    (start, end)
}

fn category_color(category: LogCategory) -> Color {
    match category {
        LogCategory::Info => Color::Gray,
        LogCategory::Connect => Color::Cyan,
        LogCategory::Success => Color::Green,
        LogCategory::Error => Color::Red,
        LogCategory::Publish => Color::Magenta,
        LogCategory::Stream => Color::Blue,
        LogCategory::Disconnect => Color::Yellow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_follows_tail() {
        assert_eq!(window(0, 0, 10), (0, 0));
        assert_eq!(window(5, 0, 10), (0, 5));
        assert_eq!(window(100, 0, 10), (90, 100));
    }

    #[test]
    fn test_window_scrolls_back_and_clamps() {
        assert_eq!(window(100, 20, 10), (70, 80));
        assert_eq!(window(100, 500, 10), (0, 0));
        assert_eq!(window(5, 2, 10), (0, 3));
    }

    #[test]
    fn test_each_category_gets_a_color() {
        assert_eq!(category_color(LogCategory::Success), Color::Green);
        assert_eq!(category_color(LogCategory::Error), Color::Red);
        assert_ne!(
            category_color(LogCategory::Publish),
            category_color(LogCategory::Stream)
        );
    }
}
