use std::io::BufRead;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use oscbridge_peer::{Bridge, BridgeConfig, BridgeHandle, BoardTransport, StaticBoards};
use oscbridge_wire::{decode, encode, parse_message};
use oscbridge_xml::{BoardInfo, BoardKind, Endpoint};
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_forwarded, print_status, OutputFormat};

/// Reports packets bound for boards on stdout instead of sending them.
struct StdoutTransport {
    format: OutputFormat,
}

impl BoardTransport for StdoutTransport {
    fn deliver(&self, destination: &Endpoint, packet: Bytes) -> std::io::Result<()> {
        print_forwarded(
            &destination.to_string(),
            &packet,
            &decode(&packet),
            self.format,
        );
        Ok(())
    }
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let boards = args
        .boards
        .iter()
        .map(|raw| parse_board(raw))
        .collect::<CliResult<Vec<_>>>()?;

    let config = BridgeConfig::default()
        .with_bind_address(args.bind)
        .with_port(args.port)
        .with_outbound_queue_depth(args.queue_depth);
    let bridge = Bridge::start(
        config,
        Arc::new(StaticBoards::new(boards)),
        Arc::new(StdoutTransport { format }),
    )
    .map_err(|err| peer_error("bridge failed to start", err))?;

    if let Some(addr) = bridge.local_addr() {
        print_status("listening", addr, format);
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    if let Some(source) = args.inject {
        let handle = bridge.handle();
        thread::Builder::new()
            .name("oscbridge-inject".to_string())
            .spawn(move || inject_stdin(&handle, Endpoint::new(source)))
            .map_err(|err| CliError::new(INTERNAL, format!("failed to start stdin reader: {err}")))?;
    }

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    info!(peers = bridge.peer_count(), "shutting down");
    bridge.shutdown();
    Ok(SUCCESS)
}

/// `LOCATION[:usb|:ethernet]`. Without a suffix, IP addresses are Ethernet boards.
pub fn parse_board(raw: &str) -> CliResult<BoardInfo> {
    let (location, kind) = match raw.rsplit_once(':') {
        Some((location, "usb")) => (location, BoardKind::UsbSerial),
        Some((location, "ethernet")) => (location, BoardKind::Ethernet),
        _ if raw.parse::<IpAddr>().is_ok() => (raw, BoardKind::Ethernet),
        _ => (raw, BoardKind::UsbSerial),
    };
    if location.is_empty() {
        return Err(CliError::usage(format!("board '{raw}' has no location")));
    }
    Ok(BoardInfo::new(location, kind))
}

fn inject_stdin(handle: &BridgeHandle, source: Endpoint) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "stdin read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let packet = match parse_message(&line).and_then(|msg| encode(&[msg])) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(%line, error = %err, "ignoring unparsable message");
                continue;
            }
        };
        if handle.board_packet(source.clone(), &packet).is_err() {
            return;
        }
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
