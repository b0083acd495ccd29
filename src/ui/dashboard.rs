use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::{App, SettingsField};
use crate::types::{CameraStatus, ConnectionStatus, ModelStatus};

pub fn render_status(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let resolution = match app.resolution {
        Some((w, h)) => format!("{w}x{h}"),
        None => "-".to_string(),
    };
    let frame_size = match app.last_frame_bytes {
        Some(bytes) => format!("  last frame {}KB", bytes.div_ceil(1024)),
        None => String::new(),
    };

    let lines = vec![
        Line::from(vec![
            Span::raw("Connection  "),
            Span::styled(
                app.connection.label(),
                Style::default()
                    .fg(connection_color(app.connection))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("  {}", app.settings.broker_display())),
        ]),
        Line::from(format!(
            "Gesture     {} {}  ({:.0}%)",
            app.gesture.glyph(),
            app.gesture.label(),
            app.confidence * 100.0
        )),
        Line::from(vec![
            Span::raw("Stream      "),
            Span::styled(stream_line(app), Style::default().fg(stream_color(app))),
            Span::raw(frame_size),
        ]),
        Line::from(vec![
            Span::raw("Camera      "),
            Span::styled(
                app.camera.label(),
                Style::default().fg(camera_color(&app.camera)),
            ),
        ]),
        Line::from(vec![
            Span::raw("Models      "),
            Span::styled(
                app.model.label(),
                Style::default().fg(model_color(&app.model)),
            ),
        ]),
        Line::from(format!("Resolution  {resolution}")),
        Line::from(format!(
            "Payload     {} @ {} FPS target",
            if app.settings.base64 { "base64" } else { "binary" },
            app.settings.fps
        )),
        Line::from(format!(
            "Hand state  {}",
            if app.settings.publish_hand { "publishing" } else { "off" }
        )),
    ];

    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Status ")),
        area,
    );
}

pub fn render_settings(
    f: &mut ratatui::Frame,
    app: &App,
    selected: usize,
    editing: Option<&str>,
    area: Rect,
) {
    let mut lines = Vec::new();
    for (i, field) in SettingsField::ALL.iter().enumerate() {
        let selected_now = i == selected;
        let label_style = if selected_now {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let marker = if selected_now { "> " } else { "  " };
        let mut spans = vec![
            Span::styled(marker, label_style),
            Span::styled(format!("{:<13}", field.label()), label_style),
        ];
        match editing {
            Some(buffer) if selected_now => {
                spans.push(Span::raw(buffer.to_string()));
                spans.push(Span::styled(" ", Style::default().add_modifier(Modifier::REVERSED)));
            }
            _ => spans.push(Span::raw(app.field_value(*field))),
        }
        lines.push(Line::from(spans));
    }
    lines.push(Line::from(format!(
        "  {:<13}{}",
        "Transport",
        app.settings.transport.label()
    )));
    lines.push(Line::from(Span::styled(
        "  enter edit  [/] history  t transport",
        Style::default().add_modifier(Modifier::DIM),
    )));

    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Settings ")),
        area,
    );
}

pub fn render_help(f: &mut ratatui::Frame, area: Rect) {
    f.render_widget(
        Paragraph::new(Span::styled(
            " c connect  d disconnect  v video  h hand  b payload  -/+ fps  e export  x clear  q quit",
            Style::default().add_modifier(Modifier::DIM),
        )),
        area,
    );
}

/// Status pane stream text, one of Disabled / Enabled-but-waiting /
/// Streaming with the measured rate / encoder error.
fn stream_line(app: &App) -> String {
    if let Some(err) = &app.stream_error {
        return format!("Error: {err}");
    }
    if !app.settings.publish_video {
        return "Disabled".to_string();
    }
    if app.is_streaming() {
        match app.measured_fps {
            Some(fps) => format!("Streaming ({fps:.1} FPS)"),
            None => "Streaming".to_string(),
        }
    } else {
        "Enabled (waiting for connection)".to_string()
    }
}

fn connection_color(status: ConnectionStatus) -> Color {
    match status {
        ConnectionStatus::Connected => Color::Green,
        ConnectionStatus::Connecting => Color::Yellow,
        ConnectionStatus::Failed => Color::Red,
        ConnectionStatus::Disconnected => Color::DarkGray,
    }
}

fn stream_color(app: &App) -> Color {
    if app.stream_error.is_some() {
        Color::Red
    } else if app.is_streaming() {
        Color::Green
    } else {
        Color::DarkGray
    }
}

fn camera_color(status: &CameraStatus) -> Color {
    match status {
        CameraStatus::Active => Color::Green,
        CameraStatus::Initializing => Color::Yellow,
        CameraStatus::Error(_) => Color::Red,
    }
}

fn model_color(status: &ModelStatus) -> Color {
    match status {
        ModelStatus::Ready => Color::Green,
        ModelStatus::Loading | ModelStatus::Downloading { .. } => Color::Yellow,
        ModelStatus::Failed(_) => Color::Red,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    fn test_app() -> App {
        let (tx, rx) = crossbeam_channel::unbounded();
        std::mem::forget(rx);
        App::new(
            Settings::default(),
            PathBuf::from("unused-config.toml"),
            Arc::new(Mutex::new(None)),
            tx,
        )
    }

    #[test]
    fn test_stream_line_states() {
        let mut app = test_app();
        assert_eq!(stream_line(&app), "Disabled");

        app.settings.publish_video = true;
        assert_eq!(stream_line(&app), "Enabled (waiting for connection)");

        app.stream_error = Some("boom".to_string());
        assert_eq!(stream_line(&app), "Error: boom");
    }

    #[test]
    fn test_connection_colors_distinguish_states() {
        assert_eq!(connection_color(ConnectionStatus::Connected), Color::Green);
        assert_eq!(connection_color(ConnectionStatus::Failed), Color::Red);
        assert_ne!(
            connection_color(ConnectionStatus::Connecting),
            connection_color(ConnectionStatus::Disconnected)
        );
    }
}
