pub mod app;
pub mod event;
pub mod ui;
pub mod widgets;

use crate::config::Config;
use crate::engine::EngineView;
use crate::feedback::{Actuator, TerminalBell};
use crate::focus::FocusOutcome;
use crate::radio::{DeviceId, RadioTransport};
use crate::scanner::{ScanScheduler, ScannerHandle};
use anyhow::{Context, Result};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::LevelFilter;
use ratatui::prelude::*;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

pub use app::{Action, App, Screen};

/// Events delivered to the app from the scanner side
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// The feedback timer fired
    Pulse,
    FocusStarted(DeviceId),
    FocusEnded(Option<FocusOutcome>),
    Error(String),
}

/// Feedback actuator for the TUI: rings the bell and flashes the locate view
struct TuiPulse {
    events: mpsc::Sender<TuiEvent>,
    bell: TerminalBell,
}

impl Actuator for TuiPulse {
    fn pulse(&self) {
        self.bell.pulse();
        // Dropped pulses only cost a frame of highlight
        let _ = self.events.try_send(TuiEvent::Pulse);
    }
}

/// Setup terminal for TUI mode
fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore terminal to normal mode
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Run the TUI application
pub async fn run_tui(config: Config, transport: Box<dyn RadioTransport>) -> Result<()> {
    // Disable logging to prevent interference with TUI display
    log::set_max_level(LevelFilter::Off);

    let (event_tx, event_rx) = mpsc::channel::<TuiEvent>(256);

    let actuator = Arc::new(TuiPulse {
        events: event_tx,
        bell: TerminalBell,
    });
    let handle = ScanScheduler::new(&config, transport, actuator)
        .spawn()
        .context("Failed to open the radio transport")?;

    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic);
    }));

    let mut app = App::new(event_rx, config.feedback.curve());
    let mut terminal = setup_terminal()?;

    // 20 FPS
    let tick_rate = Duration::from_millis(50);

    let result = run_event_loop(&mut terminal, &mut app, &handle, tick_rate).await;

    handle.stop().await;
    restore_terminal(&mut terminal)?;

    result
}

async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    handle: &ScannerHandle,
    tick_rate: Duration,
) -> Result<()> {
    let mut view_rx = handle.view();
    let mut last_tick = Instant::now();

    loop {
        refresh_view(app, &mut view_rx);

        // Draw UI
        terminal.draw(|f| ui::draw(f, app))?;

        // Calculate timeout
        let timeout = tick_rate.saturating_sub(last_tick.elapsed());

        // Poll for events
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = crossterm::event::read()? {
                if key.kind == KeyEventKind::Press {
                    let action = match key.code {
                        KeyCode::Char('q') => {
                            app.running = false;
                            None
                        }
                        KeyCode::Char('?') => {
                            app.show_help = !app.show_help;
                            None
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            app.scroll_down();
                            None
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            app.scroll_up();
                            None
                        }
                        KeyCode::Enter if app.alert.is_some() => app.back(),
                        KeyCode::Enter => app.select_device(),
                        KeyCode::Esc | KeyCode::Backspace => app.back(),
                        _ => None,
                    };
                    if let Some(action) = action {
                        let event = perform(handle, action).await;
                        app.handle_event(event);
                    }
                }
            }
        }

        // Process events from the feedback timer
        while let Ok(tui_event) = app.event_rx.try_recv() {
            app.handle_event(tui_event);
        }

        // Tick
        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if !app.running {
            break;
        }
    }

    Ok(())
}

fn refresh_view(app: &mut App, view_rx: &mut watch::Receiver<EngineView>) {
    match view_rx.has_changed() {
        Ok(true) => {
            let view = view_rx.borrow_and_update().clone();
            app.update_view(view);
        }
        Ok(false) => {}
        Err(_) => {
            if app.last_error.is_none() {
                app.last_error = Some("Scanner stopped".to_string());
            }
        }
    }
}

/// Carry out an app action against the scanner and report the result as an event
async fn perform(handle: &ScannerHandle, action: Action) -> TuiEvent {
    match action {
        Action::Locate(id) => match handle.set_focus(id.clone()).await {
            Ok(_) => TuiEvent::FocusStarted(id),
            Err(e) => TuiEvent::Error(e.to_string()),
        },
        Action::StopLocating => match handle.clear_focus().await {
            Ok(outcome) => TuiEvent::FocusEnded(outcome),
            Err(e) => TuiEvent::Error(e.to_string()),
        },
    }
}
