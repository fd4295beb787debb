//! BlueZ transport driven through the `bluetoothctl` tool.
//!
//! Capability is polled with `bluetoothctl show`. Each scan request runs
//! `bluetoothctl --timeout <secs> scan on` and turns its `[NEW]`/`[CHG]`
//! device lines into discoveries.

use super::{DeviceId, Discovery, RadioEvent, RadioState, RadioTransport};
use crate::error::TransportError;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const BLUETOOTHCTL: &str = "bluetoothctl";

/// `bluetoothctl` blocks indefinitely when bluetoothd is not running
const SHOW_TIMEOUT: Duration = Duration::from_secs(3);

pub struct BluezTransport {
    scan_window_secs: u64,
    poll_interval: Duration,
    events: Option<mpsc::Sender<RadioEvent>>,
    watcher: Option<JoinHandle<()>>,
    scan: Option<JoinHandle<()>>,
}

impl BluezTransport {
    pub fn new(scan_window_secs: u64, poll_interval: Duration) -> Self {
        BluezTransport {
            scan_window_secs: scan_window_secs.max(1),
            poll_interval,
            events: None,
            watcher: None,
            scan: None,
        }
    }
}

impl RadioTransport for BluezTransport {
    fn open(&mut self, events: mpsc::Sender<RadioEvent>) -> Result<(), TransportError> {
        let poll_interval = self.poll_interval;
        let watcher_events = events.clone();

        self.watcher = Some(tokio::spawn(async move {
            let mut last: Option<RadioState> = None;
            loop {
                let state = query_capability().await;
                if last != Some(state) {
                    debug!("Controller state: {:?}", state);
                    if watcher_events
                        .send(RadioEvent::Capability(state))
                        .await
                        .is_err()
                    {
                        break;
                    }
                    last = Some(state);
                }
                sleep(poll_interval).await;
            }
        }));
        self.events = Some(events);

        info!(
            "BlueZ transport opened (scan window {}s, state poll every {} ms)",
            self.scan_window_secs,
            poll_interval.as_millis()
        );
        Ok(())
    }

    fn start_scan(&mut self) -> Result<(), TransportError> {
        let events = self.events.clone().ok_or(TransportError::NotOpen)?;
        if self.scan.as_ref().is_some_and(|scan| !scan.is_finished()) {
            return Ok(());
        }

        let window = self.scan_window_secs.to_string();
        let mut child = Command::new(BLUETOOTHCTL)
            .args(["--timeout", window.as_str(), "scan", "on"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: BLUETOOTHCTL,
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            return Ok(());
        };

        self.scan = Some(tokio::spawn(async move {
            let mut parser = ScanParser::default();
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(discovery) = parser.parse_line(&line) {
                            if events.send(RadioEvent::Discovered(discovery)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Reading {} output failed: {}", BLUETOOTHCTL, e);
                        break;
                    }
                }
            }
            let _ = child.wait().await;
        }));
        Ok(())
    }

    fn stop_scan(&mut self) {
        // Dropping the task drops the child, which kills it
        if let Some(scan) = self.scan.take() {
            scan.abort();
        }
    }

    fn close(&mut self) {
        self.stop_scan();
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.events = None;
    }
}

impl Drop for BluezTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Ask the controller for its current power state
pub async fn query_capability() -> RadioState {
    let output = Command::new(BLUETOOTHCTL)
        .arg("show")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match timeout(SHOW_TIMEOUT, output).await {
        Ok(Ok(output)) => parse_show_output(
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        ),
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
            debug!("{} not installed", BLUETOOTHCTL);
            RadioState::Unsupported
        }
        Ok(Err(e)) if e.kind() == ErrorKind::PermissionDenied => RadioState::Unauthorized,
        Ok(Err(e)) => {
            warn!("Failed to run {} show: {}", BLUETOOTHCTL, e);
            RadioState::Unknown
        }
        Err(_) => {
            debug!("{} show timed out, is bluetoothd running?", BLUETOOTHCTL);
            RadioState::Unsupported
        }
    }
}

/// Map `bluetoothctl show` output to a capability state
pub fn parse_show_output(stdout: &str, stderr: &str) -> RadioState {
    let combined = format!("{}\n{}", stdout, stderr);
    let lower = combined.to_lowercase();

    if lower.contains("access denied") || lower.contains("not authorized") {
        return RadioState::Unauthorized;
    }
    if lower.contains("no default controller") {
        return RadioState::Unsupported;
    }

    for line in stdout.lines() {
        let line = strip_ansi(line);
        if let Some(value) = line.trim().strip_prefix("Powered:") {
            return match value.trim() {
                "yes" => RadioState::PoweredOn,
                _ => RadioState::PoweredOff,
            };
        }
    }
    RadioState::Unknown
}

#[derive(Debug, Default, Clone)]
struct Advertised {
    name: Option<String>,
    tx_power: Option<i32>,
}

/// Stateful parser for one `bluetoothctl scan` run
///
/// Names and tx power arrive on their own lines; they are remembered and
/// attached to the next RSSI line for the same address.
#[derive(Debug, Default)]
pub struct ScanParser {
    known: HashMap<String, Advertised>,
}

impl ScanParser {
    pub fn parse_line(&mut self, raw: &str) -> Option<Discovery> {
        let line = strip_ansi(raw);
        let rest = ["[NEW]", "[CHG]"]
            .iter()
            .find_map(|tag| line.find(tag).map(|at| &line[at + tag.len()..]))?;
        let rest = rest.trim_start().strip_prefix("Device ")?;

        let (address, detail) = match rest.split_once(' ') {
            Some((address, detail)) => (address, detail.trim()),
            None => (rest.trim(), ""),
        };
        if !is_address(address) {
            return None;
        }

        let entry = self.known.entry(address.to_string()).or_default();

        if let Some(value) = detail.strip_prefix("RSSI:") {
            let rssi = parse_number(value)?;
            return Some(Discovery {
                id: DeviceId::new(address),
                name: entry.name.clone(),
                signal_strength: rssi,
                calibration_power: entry.tx_power,
            });
        }

        if let Some(value) = detail.strip_prefix("TxPower:") {
            entry.tx_power = parse_number(value);
        } else if let Some(value) = detail
            .strip_prefix("Name:")
            .or_else(|| detail.strip_prefix("Alias:"))
        {
            set_name(entry, address, value);
        } else if line.contains("[NEW]") && !detail.contains(':') {
            set_name(entry, address, detail);
        }
        None
    }
}

fn set_name(entry: &mut Advertised, address: &str, value: &str) {
    let value = value.trim();
    // BlueZ falls back to the address with dashes when a device has no name
    if value.is_empty() || value.replace('-', ":").eq_ignore_ascii_case(address) {
        return;
    }
    entry.name = Some(value.to_string());
}

fn is_address(s: &str) -> bool {
    s.len() == 17
        && s.split(':').count() == 6
        && s.split(':')
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Accepts "-67" as well as "0xffffffbd (-67)"
fn parse_number(value: &str) -> Option<i32> {
    let value = value.trim();
    let decimal = match (value.find('('), value.find(')')) {
        (Some(open), Some(close)) if open < close => &value[open + 1..close],
        _ => value,
    };
    decimal.trim().parse().ok()
}

/// Remove ANSI escape sequences and readline markers
fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\x1b' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    // CSI: parameters until a final byte in @..~
                    for c in chars.by_ref() {
                        if ('@'..='~').contains(&c) {
                            break;
                        }
                    }
                }
            }
            '\x01' | '\x02' | '\r' => {}
            _ => out.push(c),
        }
    }
    out
}
