mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "oscbridge", version, about = "OSC codec and OSC-to-XML TCP bridge")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). OSCBRIDGE_LOG directives take precedence.
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_boards() {
        let cli = Cli::try_parse_from([
            "oscbridge",
            "serve",
            "--port",
            "12000",
            "--board",
            "/dev/ttyACM0",
            "--board",
            "192.168.0.200:ethernet",
        ])
        .expect("serve args should parse");

        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.port, 12000);
                assert_eq!(args.boards.len(), 2);
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_hex_and_file_together() {
        let err = Cli::try_parse_from(["oscbridge", "decode", "2f61", "--file", "packet.bin"])
            .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn send_requires_destination() {
        let err = Cli::try_parse_from(["oscbridge", "send", "localhost:11000", "/led 1"])
            .expect_err("missing --to should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn global_format_after_subcommand() {
        let cli = Cli::try_parse_from(["oscbridge", "encode", "/led 1", "--format", "raw"])
            .expect("encode args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Raw)));
        assert!(matches!(cli.command, Command::Encode(_)));
    }
}
