use std::io::{Read, Write};
use std::time::Duration;

use oscbridge_transport::connect;
use oscbridge_xml::{frame_document, messages_to_xml, Endpoint, DOCUMENT_DELIMITER};
use serde::Serialize;
use tracing::debug;

use crate::cmd::{parse_message_args, SendArgs};
use crate::exit::{io_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

/// Documents the bridge sends before anything else: policy and board list.
const GREETING_DOCUMENTS: usize = 2;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct SentOutput<'a> {
    event: &'a str,
    bridge: &'a str,
    destination: String,
    messages: usize,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let messages = parse_message_args(&args.messages)?;
    let destination = Endpoint {
        address: args.to,
        port: args.port,
    };
    let doc = messages_to_xml(&messages, &destination);

    let mut stream =
        connect(&args.bridge).map_err(|err| transport_error("connect failed", err))?;
    stream
        .set_read_timeout(Some(READ_TIMEOUT))
        .map_err(|err| transport_error("connect failed", err))?;

    // Consume the greeting so closing does not reset the connection under unread data.
    let mut buf = [0u8; 4096];
    let mut seen = 0;
    while seen < GREETING_DOCUMENTS {
        let n = stream
            .read(&mut buf)
            .map_err(|err| io_error("reading greeting failed", err))?;
        if n == 0 {
            break;
        }
        seen += buf[..n].iter().filter(|&&b| b == DOCUMENT_DELIMITER).count();
    }

    stream
        .write_all(&frame_document(&doc))
        .and_then(|()| stream.flush())
        .map_err(|err| io_error("send failed", err))?;
    stream
        .shutdown_write()
        .map_err(|err| transport_error("send failed", err))?;

    // The bridge closes its side once it has read our end of stream.
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => debug!(bytes = n, "ignoring bridge traffic"),
        }
    }

    match format {
        OutputFormat::Json => print_json(&SentOutput {
            event: "sent",
            bridge: &args.bridge,
            destination: destination.to_string(),
            messages: messages.len(),
        }),
        OutputFormat::Raw => {}
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("sent {} message(s) to {destination}", messages.len());
        }
    }
    Ok(SUCCESS)
}
