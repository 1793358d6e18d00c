use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use oscbridge_peer::{DEFAULT_OUTBOUND_QUEUE_DEPTH, DEFAULT_PORT};
use oscbridge_wire::{parse_messages, OscMessage};

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod listen;
pub mod send;
pub mod serve;
pub mod version;
pub mod xml;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the XML bridge for TCP peers.
    Serve(ServeArgs),
    /// Encode messages as an OSC packet.
    Encode(EncodeArgs),
    /// Decode an OSC packet.
    Decode(DecodeArgs),
    /// Render messages as an OSCPACKET document.
    Xml(XmlArgs),
    /// Connect to a bridge and send messages to a board.
    Send(SendArgs),
    /// Connect to a bridge and print the documents it sends.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Xml(args) => xml::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Parse message arguments such as `"/appled/0/state 1"`.
pub fn parse_message_args(messages: &[String]) -> CliResult<Vec<OscMessage>> {
    parse_messages(messages.iter().map(String::as_str))
        .map_err(|err| CliError::usage(format!("invalid message: {err}")))
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,
    /// TCP port for XML peers (0 picks a free port).
    #[arg(long, short = 'p', env = "OSCBRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Board to announce (repeatable). Kind defaults to ethernet for IP addresses.
    #[arg(long = "board", value_name = "LOCATION[:usb|:ethernet]")]
    pub boards: Vec<String>,
    /// Documents buffered per peer before it is dropped.
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_QUEUE_DEPTH)]
    pub queue_depth: usize,
    /// Read messages from stdin (one per line) and broadcast them as traffic from SOURCE.
    #[arg(long, value_name = "SOURCE")]
    pub inject: Option<String>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Messages, each an address followed by arguments.
    #[arg(required = true, value_name = "MESSAGE")]
    pub messages: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Packet bytes as hex (whitespace allowed).
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    pub hex: Option<String>,
    /// Read the raw packet from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct XmlArgs {
    /// Board address placed in the ADDRESS attribute.
    #[arg(long)]
    pub source: String,
    /// Board port placed in the PORT attribute.
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(required = true, value_name = "MESSAGE")]
    pub messages: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Bridge address, e.g. localhost:11000.
    pub bridge: String,
    /// Destination board location.
    #[arg(long)]
    pub to: String,
    /// Destination board port.
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(required = true, value_name = "MESSAGE")]
    pub messages: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Bridge address, e.g. localhost:11000.
    pub bridge: String,
    /// Exit after receiving N documents.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
