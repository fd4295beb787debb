use crate::tui::app::{App, Screen};
use crate::tui::widgets::{
    device_table::render_device_table,
    help_overlay::{centered, render_help},
    locate_panel::render_locate_panel,
    status_bar::render_status_bar,
};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

/// Main draw function for the TUI
pub fn draw(frame: &mut Frame, app: &App) {
    let size = frame.area();

    // Main layout: Header, Content, Status Bar
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Content
            Constraint::Length(3), // Status bar
        ])
        .split(size);

    draw_header(frame, main_chunks[0], app);

    match &app.screen {
        Screen::DeviceList => render_device_table(frame, main_chunks[1], app),
        Screen::Locate(id) => render_locate_panel(frame, main_chunks[1], app, id),
    }

    render_status_bar(frame, main_chunks[2], app);

    if app.show_help {
        render_help(frame, size);
    }

    if let Some(message) = &app.alert {
        draw_alert(frame, size, message);
    }
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let hint = if app.is_locating() {
        "[Esc] Back  [?] Help  [q] Quit"
    } else {
        "[Enter] Locate  [?] Help  [q] Quit"
    };

    let title = vec![
        Span::styled(
            " SWEEPER ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled("BLE Proximity Finder", Style::default().fg(Color::White)),
        Span::raw("  "),
        Span::styled(hint, Style::default().fg(Color::DarkGray)),
    ];

    let header = Paragraph::new(Line::from(title)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(header, area);
}

fn draw_alert(frame: &mut Frame, area: Rect, message: &str) {
    let popup_area = centered(area, 48, 7);
    frame.render_widget(Clear, popup_area);

    let content = vec![
        Line::from(""),
        Line::from(Span::styled(
            message.to_string(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Press Esc to dismiss",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let popup = Paragraph::new(content).wrap(Wrap { trim: true }).block(
        Block::default()
            .title(" Device lost ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red)),
    );

    frame.render_widget(popup, popup_area);
}
