use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn, LevelFilter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sweeper::config::{Config, TransportKind};
use sweeper::distance;
use sweeper::engine::EngineView;
use sweeper::feedback::{PulseCurve, TerminalBell};
use sweeper::radio::bluez::query_capability;
use sweeper::radio::replay::Scenario;
use sweeper::radio::{BluezTransport, DeviceId, RadioTransport, ReplayTransport};
use sweeper::scanner::{ScanScheduler, ScannerHandle, TickEndClear};
use sweeper::tui;

#[derive(Parser)]
#[command(name = "sweeper")]
#[command(author = "spikehead")]
#[command(version = "0.1.0")]
#[command(about = "Bluetooth LE proximity finder")]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Replay a scenario file instead of using the radio (overrides config)
    #[arg(short, long)]
    replay: Option<PathBuf>,

    /// Scan tick length in milliseconds (overrides config)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan and print the devices in range after every tick
    Scan {
        /// One JSON object per tick instead of a table
        #[arg(long)]
        json: bool,

        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Locate one device; the terminal bell quickens as it gets closer
    Locate {
        /// Device identifier as shown by `scan`
        id: String,

        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Start the interactive device list and locate view
    Tui,

    /// Show the Bluetooth controller state
    Status,

    /// Write a default config.json and a sample scenario.json
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_secs()
        .init();

    // Handle init command before loading config
    if matches!(cli.command, Commands::Init) {
        return handle_init();
    }

    // Load configuration
    let mut config = if cli.config.exists() {
        Config::load(&cli.config).context("Failed to load config")?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };

    // Override config with CLI args
    if let Some(replay) = cli.replay {
        config.transport.kind = TransportKind::Replay;
        config.transport.replay_path = replay.to_string_lossy().to_string();
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.scan.interval_ms = interval_ms;
    }
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Scan { json, ticks } => handle_scan(config, json, ticks).await,
        Commands::Locate { id, ticks } => handle_locate(config, DeviceId::new(id), ticks).await,
        Commands::Tui => {
            let transport = build_transport(&config)?;
            tui::run_tui(config, transport).await
        }
        Commands::Status => handle_status(config).await,
        Commands::Init => unreachable!(),
    }
}

fn build_transport(config: &Config) -> Result<Box<dyn RadioTransport>> {
    let transport: Box<dyn RadioTransport> = match config.transport.kind {
        TransportKind::Bluez => Box::new(BluezTransport::new(
            config.transport.scan_window_secs,
            Duration::from_millis(config.transport.capability_poll_ms),
        )),
        TransportKind::Replay => Box::new(
            ReplayTransport::load(&config.transport.replay_path)
                .context("Failed to load replay scenario")?,
        ),
    };
    Ok(transport)
}

fn start_scanner(config: &Config) -> Result<ScannerHandle> {
    let transport = build_transport(config)?;
    ScanScheduler::new(config, transport, Arc::new(TerminalBell))
        .spawn()
        .context("Failed to open the radio transport")
}

fn install_ctrlc() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl+C, stopping scan...");
        r.store(false, Ordering::SeqCst);
    })?;

    Ok(running)
}

/// Wait for the scanner to open a new tick; returns the index of the tick that just completed
async fn next_completed_tick(
    handle: &ScannerHandle,
    view_rx: &mut tokio::sync::watch::Receiver<EngineView>,
    running: &AtomicBool,
    last_tick: &mut u64,
) -> Option<(u64, EngineView)> {
    while running.load(Ordering::SeqCst) && handle.is_running() {
        tokio::select! {
            changed = view_rx.changed() => {
                if changed.is_err() {
                    return None;
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => continue,
        }

        let view = view_rx.borrow_and_update().clone();
        if view.tick == *last_tick {
            continue;
        }
        *last_tick = view.tick;
        if view.tick > 1 {
            return Some((view.tick - 1, view));
        }
    }
    None
}

async fn handle_scan(config: Config, json: bool, ticks: Option<u64>) -> Result<()> {
    let running = install_ctrlc()?;
    let handle = start_scanner(&config)?;
    let mut view_rx = handle.view();
    let mut last_tick = 0;

    while let Some((completed, view)) =
        next_completed_tick(&handle, &mut view_rx, &running, &mut last_tick).await
    {
        if json {
            println!("{}", serde_json::to_string(&view)?);
        } else {
            print_device_list(completed, &view);
        }
        if ticks.is_some_and(|limit| completed >= limit) {
            break;
        }
    }

    let view = handle.stop().await;
    info!(
        "Scanned {} ticks: {} samples accepted, {} dropped, {} devices evicted",
        view.stats.ticks, view.stats.accepted, view.stats.rejected, view.stats.evicted
    );
    Ok(())
}

fn print_device_list(tick: u64, view: &EngineView) {
    println!(
        "\x1b[36mTick {}\x1b[0m  radio {}  {} devices in range",
        tick,
        view.radio_state.label(),
        view.devices.len()
    );
    if let Some(reason) = view.capability_error() {
        println!("  \x1b[31m{}\x1b[0m", reason);
    }
    for device in &view.devices {
        println!(
            "  {:<24} {:<17} {:>4} dBm  {:>9}  {}",
            device.name,
            device.id.as_str(),
            device.signal_strength,
            distance::format_distance(device.distance_m),
            device.trend.label()
        );
    }
}

async fn handle_locate(config: Config, id: DeviceId, ticks: Option<u64>) -> Result<()> {
    let running = install_ctrlc()?;
    let handle = start_scanner(&config)?;
    let curve = config.feedback.curve();

    if handle.set_focus(id.clone()).await?.is_none() {
        info!("Waiting for {} to advertise...", id);
    }

    let mut view_rx = handle.view();
    let mut last_tick = 0;

    // The last requested tick is reported from the tick-end clear below
    let last_in_loop = ticks.map(|limit| limit.saturating_sub(1));
    if last_in_loop != Some(0) {
        while let Some((completed, view)) =
            next_completed_tick(&handle, &mut view_rx, &running, &mut last_tick).await
        {
            print_locate_line(completed, &id, &view, &curve);
            if last_in_loop.is_some_and(|last| completed >= last) {
                break;
            }
        }
    }

    match handle.clear_focus_at_tick_end().await {
        Ok(TickEndClear { view, outcome }) => {
            print_locate_line(view.tick, &id, &view, &curve);
            if let Some(outcome) = outcome.filter(|outcome| outcome.lost) {
                warn!("{}", outcome.alert_message());
            }
        }
        Err(e) => warn!("Could not end locate cleanly: {}", e),
    }
    handle.stop().await;
    Ok(())
}

fn print_locate_line(tick: u64, id: &DeviceId, view: &EngineView, curve: &PulseCurve) {
    let device = view
        .focus
        .as_ref()
        .and_then(|focus| focus.device.as_ref().map(|device| (focus.fresh, device)));

    let Some((fresh, device)) = device else {
        println!("Tick {}: {} not heard yet", tick, id);
        return;
    };

    let trend = device.display_trend();
    let mut line = format!(
        "Tick {}: {}  {}  {}  {}",
        tick,
        device.name,
        distance::format_distance(device.distance_m),
        distance::distance_category(device.distance_m),
        trend.label()
    );
    if distance::is_reading(device.distance_m) {
        line.push_str(&format!(
            "  (pulse every {} ms)",
            curve.period_for(device.distance_m).as_millis()
        ));
    }
    if !fresh {
        line.push_str("  [not heard this scan]");
    }
    println!("{}", line);
    if distance::is_reading(device.distance_m) && device.distance_m <= distance::IN_REACH_M {
        println!("\x1b[32m{} is in reach!\x1b[0m", device.name);
    }
}

async fn handle_status(config: Config) -> Result<()> {
    let state = match config.transport.kind {
        TransportKind::Bluez => query_capability().await,
        TransportKind::Replay => {
            let scenario = Scenario::load(&config.transport.replay_path)
                .context("Failed to load replay scenario")?;
            println!(
                "Replay scenario {}: {} frames every {} ms",
                config.transport.replay_path,
                scenario.frames.len(),
                scenario.frame_interval_ms
            );
            scenario.initial_state
        }
    };

    match state.capability_error() {
        None => println!("\x1b[32m[{}]\x1b[0m Bluetooth is ready to scan", state.label()),
        Some(reason) => println!("\x1b[33m[{}]\x1b[0m {}", state.label(), reason),
    }
    Ok(())
}

fn handle_init() -> Result<()> {
    info!("Initializing sweeper configuration...");

    let config = Config::default();
    config.save("config.json")?;
    info!("Created config.json");

    Scenario::sample().save(&config.transport.replay_path)?;
    info!("Created {}", config.transport.replay_path);

    info!("Initialization complete!");
    info!("Edit config.json to customize settings.");
    info!("Run 'sweeper tui' to scan, or 'sweeper --replay scenario.json tui' to try the sample.");

    Ok(())
}
