use std::fs;

use oscbridge_wire::decode_packet;
use oscbridge_xml::decode_hex;

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_decoded, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let packet = read_packet(&args)?;
    let decoded = decode_packet(&packet);

    let time_tag = decoded
        .time_tag
        .map(|tag| format!("{}.{}", tag.seconds, tag.fraction));
    print_decoded(&decoded.messages, time_tag, &decoded.rejected, format);

    if decoded.messages.is_empty() && !decoded.rejected.is_empty() {
        return Err(CliError::new(DATA_INVALID, "no valid OSC messages in input"));
    }
    Ok(SUCCESS)
}

fn read_packet(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    let text: String = args
        .hex
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    decode_hex(&text).ok_or_else(|| CliError::usage("packet must be an even number of hex digits"))
}
