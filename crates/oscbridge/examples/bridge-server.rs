//! Bridge with one simulated board that reports a rising analog value.
//!
//! Run with:
//!   cargo run --example bridge-server --features peer
//!
//! In another terminal:
//!   cargo run --features cli -- listen localhost:11000
//!   cargo run --features cli -- send localhost:11000 --to 192.168.0.200 "/appled/0/state 1"

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use oscbridge::peer::{Bridge, BridgeConfig, StaticBoards};
use oscbridge::wire::{decode, encode, OscMessage, OscValue};
use oscbridge::xml::{BoardInfo, BoardKind, Endpoint};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let board = BoardInfo::new("192.168.0.200", BoardKind::Ethernet);
    let transport = |destination: &Endpoint, packet: Bytes| {
        for msg in decode(&packet) {
            eprintln!("to {destination}: {msg}");
        }
        Ok::<(), std::io::Error>(())
    };

    let bridge = Bridge::start(
        BridgeConfig::default(),
        Arc::new(StaticBoards::new(vec![board])),
        Arc::new(transport),
    )?;
    eprintln!("Listening on port {}", bridge.listen_port());

    let handle = bridge.handle();
    let source = Endpoint::with_port("192.168.0.200", 10000);
    for value in (0..1024).step_by(32).cycle() {
        let msg = OscMessage::new("/analogin/0/value", vec![OscValue::Int(value)])?;
        handle.board_packet(source.clone(), &encode(&[msg])?)?;
        thread::sleep(Duration::from_millis(250));
    }
    Ok(())
}
