use oscbridge_wire::{encode, BUNDLE_TAG};

use crate::cmd::{parse_message_args, EncodeArgs};
use crate::exit::{wire_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let messages = parse_message_args(&args.messages)?;
    let packet = encode(&messages).map_err(|err| wire_error("encode failed", err))?;
    print_encoded(&packet, packet.starts_with(BUNDLE_TAG), format);
    Ok(SUCCESS)
}
