use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use oscbridge_transport::connect;
use oscbridge_xml::DOCUMENT_DELIMITER;

use crate::cmd::ListenArgs;
use crate::exit::{io_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_document, OutputFormat};

/// How often a blocked read wakes to check for Ctrl-C.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let mut stream =
        connect(&args.bridge).map_err(|err| transport_error("connect failed", err))?;
    stream
        .set_read_timeout(Some(POLL_INTERVAL))
        .map_err(|err| transport_error("connect failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut pending = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let n = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(err) => return Err(io_error("receive failed", err)),
        };
        pending.extend_from_slice(&chunk[..n]);

        while let Some(end) = pending.iter().position(|&b| b == DOCUMENT_DELIMITER) {
            let doc: Vec<u8> = pending.drain(..=end).collect();
            if end == 0 {
                continue;
            }
            print_document(&String::from_utf8_lossy(&doc[..end]), format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
