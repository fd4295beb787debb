use crate::tui::app::App;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Render the status bar at the bottom
pub fn render_status_bar(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let view = &app.view;

    let radio_status = match view.capability_error() {
        None => Span::styled(
            "Radio: SCANNING",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        Some(reason) => Span::styled(
            format!("Radio: {}", reason),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
    };

    let tick_status = Span::styled(
        format!("Tick: {}", view.tick),
        Style::default().fg(Color::Cyan),
    );

    let sample_status = Span::styled(
        format!(
            "Samples: {} ok / {} dropped / {} evicted",
            view.stats.accepted, view.stats.rejected, view.stats.evicted
        ),
        Style::default().fg(Color::DarkGray),
    );

    let uptime_status = Span::styled(
        format!("Uptime: {}", format_duration(app.uptime_secs())),
        Style::default().fg(Color::DarkGray),
    );

    let mut spans = vec![
        Span::raw(" "),
        radio_status,
        Span::raw("  │  "),
        tick_status,
        Span::raw("  │  "),
        sample_status,
        Span::raw("  │  "),
        uptime_status,
    ];

    if let Some(err) = &app.last_error {
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(err.clone(), Style::default().fg(Color::Red)));
    }

    let paragraph = Paragraph::new(Line::from(spans)).block(block);

    frame.render_widget(paragraph, area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(3725), "01:02:05");
    }
}
