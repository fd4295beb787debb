use crate::tui::event::{binding_label, KEY_BINDINGS};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

/// Render the help overlay
pub fn render_help(frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 50, KEY_BINDINGS.len() as u16 + 8);
    frame.render_widget(Clear, popup_area);

    let mut help_text = vec![
        Line::from(Span::styled(
            "Keyboard Shortcuts",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    for (keys, action) in KEY_BINDINGS {
        help_text.push(Line::from(vec![
            Span::styled(
                format!("  {:<18}", binding_label(keys)),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw(*action),
        ]));
    }

    help_text.push(Line::from(""));
    help_text.push(Line::from(Span::styled(
        "While locating, the bell quickens as you get closer",
        Style::default().fg(Color::DarkGray),
    )));
    help_text.push(Line::from(Span::styled(
        "Press ? or Esc to close",
        Style::default().fg(Color::DarkGray),
    )));

    let help_popup = Paragraph::new(help_text).block(
        Block::default()
            .title(" Help ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(help_popup, popup_area);
}

/// Popup rectangle centered in `area`, shrunk to fit
pub fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));
    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;
    Rect::new(popup_x, popup_y, popup_width, popup_height)
}
