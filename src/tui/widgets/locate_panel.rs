use crate::distance;
use crate::engine::FocusView;
use crate::feedback::indicator_scale;
use crate::radio::DeviceId;
use crate::tui::app::App;
use crate::tui::widgets::device_table::{signal_color, trend_arrow, trend_color};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame,
};

/// Render the locate view for the focused device
pub fn render_locate_panel(frame: &mut Frame, area: Rect, app: &App, id: &DeviceId) {
    let focus = app.view.focus.as_ref().filter(|focus| &focus.id == id);

    let border_color = if app.pulse_flash > 0 {
        Color::LightGreen
    } else {
        Color::Cyan
    };
    let name = focus
        .and_then(|focus| focus.device.as_ref())
        .map(|device| device.name.clone())
        .unwrap_or_else(|| format!("Unknown ({})", id.short()));

    let block = Block::default()
        .title(format!(" Locating {} ", name))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6), // Readout
            Constraint::Length(3), // Proximity gauge
            Constraint::Min(3),    // Rings
        ])
        .split(inner);

    let distance_m = focus
        .and_then(|focus| focus.device.as_ref())
        .map(|device| device.distance_m)
        .unwrap_or(distance::NO_READING);

    render_readout(frame, chunks[0], app, id, focus);
    render_gauge(frame, chunks[1], distance_m);
    render_rings(frame, chunks[2], distance_m);
}

fn render_readout(frame: &mut Frame, area: Rect, app: &App, id: &DeviceId, focus: Option<&FocusView>) {
    let label = Style::default().fg(Color::Yellow);
    let device = focus.and_then(|focus| focus.device.as_ref());

    let mut lines = vec![Line::from(vec![
        Span::styled("Device: ", label),
        Span::raw(id.to_string()),
    ])];

    match device {
        None => {
            lines.push(Line::from(Span::styled(
                "Waiting for the device to advertise...",
                Style::default().fg(Color::DarkGray),
            )));
        }
        Some(device) => {
            let trend = device.display_trend();
            lines.push(Line::from(vec![
                Span::styled("Distance: ", label),
                Span::styled(
                    distance::format_distance(device.distance_m),
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::styled(trend_arrow(trend), Style::default().fg(trend_color(trend))),
            ]));
            lines.push(Line::from(vec![
                Span::styled("Range: ", label),
                Span::raw(distance::distance_category(device.distance_m)),
            ]));
            lines.push(Line::from(vec![
                Span::styled("Signal: ", label),
                Span::styled(
                    format!("{} dBm", device.signal_strength),
                    Style::default().fg(signal_color(device.signal_strength)),
                ),
                Span::raw(format!(
                    " (was {} dBm, calibrated at {} dBm)",
                    device.previous_signal_strength, device.calibration_power
                )),
            ]));
            if distance::is_reading(device.distance_m) {
                let period = app.pulse_curve.period_for(device.distance_m);
                lines.push(Line::from(vec![
                    Span::styled("Pulse: ", label),
                    Span::raw(format!("every {} ms", period.as_millis())),
                ]));
            }
        }
    }

    if focus.is_some_and(|focus| !focus.fresh) && device.is_some() {
        lines.push(Line::from(Span::styled(
            "Not heard this scan",
            Style::default().fg(Color::Red),
        )));
    }

    frame.render_widget(Paragraph::new(lines), area);
}

fn render_gauge(frame: &mut Frame, area: Rect, distance_m: f64) {
    let proximity = proximity_ratio(distance_m);
    let color = if proximity > 0.66 {
        Color::Green
    } else if proximity > 0.33 {
        Color::Yellow
    } else {
        Color::Red
    };

    let gauge = Gauge::default()
        .block(Block::default().title(" Proximity ").borders(Borders::ALL))
        .gauge_style(Style::default().fg(color))
        .ratio(proximity)
        .label(format!("{:.0}%", proximity * 100.0));

    frame.render_widget(gauge, area);
}

/// Concentric rings that fill in as the device gets close
fn render_rings(frame: &mut Frame, area: Rect, distance_m: f64) {
    let lit = rings_lit(distance_m);
    let mut spans = Vec::with_capacity(RING_COUNT * 2);
    for ring in 0..RING_COUNT {
        let style = if ring < lit {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled("◯", style));
        spans.push(Span::raw(" "));
    }

    let mut lines = vec![Line::from(spans)];
    if distance::is_reading(distance_m) && distance_m <= distance::IN_REACH_M {
        lines.push(Line::from(Span::styled(
            "In reach!",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )));
    }

    frame.render_widget(Paragraph::new(lines), area);
}

const RING_COUNT: usize = 5;

/// 1.0 at the device, 0.0 at four meters and beyond or with no reading
fn proximity_ratio(distance_m: f64) -> f64 {
    if !distance::is_reading(distance_m) {
        return 0.0;
    }
    (1.0 - indicator_scale(distance_m)).clamp(0.0, 1.0)
}

fn rings_lit(distance_m: f64) -> usize {
    (proximity_ratio(distance_m) * RING_COUNT as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proximity_ratio() {
        assert_eq!(proximity_ratio(distance::NO_READING), 0.0);
        assert_eq!(proximity_ratio(0.0), 1.0);
        assert!(proximity_ratio(4.0).abs() < 1e-12);
        assert_eq!(proximity_ratio(10.0), proximity_ratio(4.0));
        assert!(proximity_ratio(0.5) > proximity_ratio(2.0));
    }

    #[test]
    fn test_rings_fill_as_device_approaches() {
        assert_eq!(rings_lit(distance::NO_READING), 0);
        assert_eq!(rings_lit(6.0), 0);
        assert_eq!(rings_lit(0.0), RING_COUNT);
        assert!(rings_lit(0.3) > rings_lit(2.0));
    }
}
