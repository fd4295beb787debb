use crate::distance;
use crate::registry::Trend;
use crate::tui::app::App;
use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

/// Render the list of devices in range, strongest first
pub fn render_device_table(frame: &mut Frame, area: Rect, app: &App) {
    let devices = &app.view.devices;
    let title = format!(" Devices in range: {} ", devices.len());

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    if devices.is_empty() {
        let hint = match app.view.capability_error() {
            Some(reason) => format!("  {}", reason),
            None => "  Searching for nearby devices...".to_string(),
        };
        frame.render_widget(
            Paragraph::new(hint)
                .style(Style::default().fg(Color::DarkGray))
                .block(block),
            area,
        );
        return;
    }

    let header_cells = ["Name", "Device ID", "Signal", "Distance", "Trend"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = devices
        .iter()
        .map(|device| {
            let cells = vec![
                Cell::from(truncate_str(&device.name, 24)),
                Cell::from(device.id.to_string()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(format!("{}dBm", device.signal_strength))
                    .style(Style::default().fg(signal_color(device.signal_strength))),
                Cell::from(distance::format_distance(device.distance_m))
                    .style(Style::default().fg(distance_color(device.distance_m))),
                Cell::from(trend_arrow(device.trend))
                    .style(Style::default().fg(trend_color(device.trend))),
            ];

            Row::new(cells).height(1)
        })
        .collect();

    let widths = [
        Constraint::Min(16),    // Name
        Constraint::Length(19), // Device ID
        Constraint::Length(8),  // Signal
        Constraint::Length(10), // Distance
        Constraint::Length(10), // Trend
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = TableState::default();
    state.select(Some(app.selected_device));

    frame.render_stateful_widget(table, area, &mut state);
}

pub fn signal_color(rssi: i32) -> Color {
    if rssi >= -50 {
        Color::Green
    } else if rssi >= -70 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn distance_color(distance_m: f64) -> Color {
    if !distance::is_reading(distance_m) {
        Color::DarkGray
    } else if distance_m < 1.0 {
        Color::Green
    } else if distance_m < 4.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

pub fn trend_arrow(trend: Trend) -> &'static str {
    match trend {
        Trend::Closer => "▲ closer",
        Trend::Farther => "▼ farther",
        Trend::Steady => "= steady",
    }
}

pub fn trend_color(trend: Trend) -> Color {
    match trend {
        Trend::Closer => Color::Green,
        Trend::Farther => Color::Red,
        Trend::Steady => Color::DarkGray,
    }
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_counts_chars() {
        assert_eq!(truncate_str("Keys", 24), "Keys");
        assert_eq!(truncate_str("Jürgen's Headphones", 10), "Jürgen'...");
    }

    #[test]
    fn test_distance_color_bands() {
        assert_eq!(distance_color(distance::NO_READING), Color::DarkGray);
        assert_eq!(distance_color(0.5), Color::Green);
        assert_eq!(distance_color(2.0), Color::Yellow);
        assert_eq!(distance_color(9.0), Color::Red);
    }
}
