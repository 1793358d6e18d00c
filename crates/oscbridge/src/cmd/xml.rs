use oscbridge_xml::{messages_to_xml, Endpoint};

use crate::cmd::{parse_message_args, XmlArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_document, OutputFormat};

pub fn run(args: XmlArgs, format: OutputFormat) -> CliResult<i32> {
    let messages = parse_message_args(&args.messages)?;
    let source = Endpoint {
        address: args.source,
        port: args.port,
    };
    print_document(&messages_to_xml(&messages, &source), format);
    Ok(SUCCESS)
}
