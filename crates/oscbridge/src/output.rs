use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use oscbridge_wire::{OscMessage, OscValue, WireError};
use oscbridge_xml::encode_hex;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
pub struct ArgumentOutput {
    #[serde(rename = "type")]
    pub kind: char,
    pub value: serde_json::Value,
}

#[derive(Serialize)]
pub struct MessageOutput {
    pub address: String,
    pub type_tag: String,
    pub arguments: Vec<ArgumentOutput>,
}

impl From<&OscMessage> for MessageOutput {
    fn from(msg: &OscMessage) -> Self {
        Self {
            address: msg.address().to_string(),
            type_tag: msg.type_tag(),
            arguments: msg
                .args()
                .iter()
                .map(|arg| ArgumentOutput {
                    kind: arg.type_tag(),
                    value: argument_json(arg),
                })
                .collect(),
        }
    }
}

fn argument_json(arg: &OscValue) -> serde_json::Value {
    match arg {
        OscValue::Int(i) => serde_json::Value::from(*i),
        OscValue::Float(f) => serde_json::Value::from(*f),
        OscValue::String(s) => serde_json::Value::from(s.as_str()),
        OscValue::Blob(b) => serde_json::Value::from(encode_hex(b)),
    }
}

#[derive(Serialize)]
struct DecodedOutput<'a> {
    event: &'a str,
    time_tag: Option<String>,
    messages: Vec<MessageOutput>,
    rejected: Vec<String>,
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    event: &'a str,
    destination: &'a str,
    size: usize,
    messages: Vec<MessageOutput>,
}

#[derive(Serialize)]
struct EncodedOutput {
    size: usize,
    bundle: bool,
    hex: String,
}

#[derive(Serialize)]
struct DocumentOutput<'a> {
    kind: &'a str,
    document: &'a str,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    event: &'a str,
    address: String,
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// One-line lifecycle notice such as `listening`.
pub fn print_status(event: &str, address: impl ToString, format: OutputFormat) {
    let address = address.to_string();
    match format {
        OutputFormat::Json => print_json(&StatusOutput { event, address }),
        OutputFormat::Raw => {}
        OutputFormat::Table | OutputFormat::Pretty => println!("{event} {address}"),
    }
}

pub fn print_decoded(
    messages: &[OscMessage],
    time_tag: Option<String>,
    rejected: &[WireError],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&DecodedOutput {
            event: "decoded",
            time_tag,
            messages: messages.iter().map(MessageOutput::from).collect(),
            rejected: rejected.iter().map(ToString::to_string).collect(),
        }),
        OutputFormat::Table => {
            println!("{}", message_table(messages, None));
            for err in rejected {
                println!("rejected: {err}");
            }
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            if let Some(tag) = time_tag {
                println!("time tag {tag}");
            }
            for msg in messages {
                println!("{msg}");
            }
            for err in rejected {
                println!("rejected: {err}");
            }
        }
    }
}

/// A packet the bridge handed to a board.
pub fn print_forwarded(
    destination: &str,
    packet: &[u8],
    messages: &[OscMessage],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&PacketOutput {
            event: "forwarded",
            destination,
            size: packet.len(),
            messages: messages.iter().map(MessageOutput::from).collect(),
        }),
        OutputFormat::Table => println!("{}", message_table(messages, Some(destination))),
        OutputFormat::Pretty => {
            for msg in messages {
                println!("-> {destination} {msg}");
            }
        }
        OutputFormat::Raw => print_raw(packet),
    }
}

pub fn print_encoded(packet: &[u8], bundle: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            size: packet.len(),
            bundle,
            hex: encode_hex(packet),
        }),
        OutputFormat::Raw => print_raw(packet),
        OutputFormat::Pretty => println!("{}", encode_hex(packet)),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OFFSET", "HEX", "TEXT"]);
            for (row, word) in packet.chunks(4).enumerate() {
                table.add_row(vec![
                    format!("{:04}", row * 4),
                    encode_hex(word),
                    word.iter()
                        .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
                        .collect(),
                ]);
            }
            println!("{table}");
        }
    }
}

pub fn print_document(doc: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DocumentOutput {
            kind: document_kind(doc),
            document: doc,
        }),
        OutputFormat::Raw => {
            print_raw(doc.as_bytes());
            print_raw(&[0]);
        }
        OutputFormat::Pretty => println!("{doc}"),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "DOCUMENT"])
                .add_row(vec![document_kind(doc), doc]);
            println!("{table}");
        }
    }
}

/// Root element name of a document, skipping declarations and doctypes.
pub fn document_kind(doc: &str) -> &str {
    let mut rest = doc;
    while let Some(start) = rest.find('<') {
        let tag = &rest[start + 1..];
        if tag.starts_with('?') || tag.starts_with('!') {
            rest = tag;
            continue;
        }
        let end = tag
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(tag.len());
        return &tag[..end];
    }
    ""
}

fn message_table(messages: &[OscMessage], destination: Option<&str>) -> Table {
    let mut header = vec!["ADDRESS", "TYPES", "ARGUMENTS"];
    if destination.is_some() {
        header.insert(0, "DESTINATION");
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    for msg in messages {
        let args: Vec<String> = msg.args().iter().map(ToString::to_string).collect();
        let mut row = vec![msg.address().to_string(), msg.type_tag(), args.join(" ")];
        if let Some(destination) = destination {
            row.insert(0, destination.to_string());
        }
        table.add_row(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use oscbridge_xml::CROSS_DOMAIN_POLICY;

    #[test]
    fn document_kind_skips_prolog() {
        assert_eq!(document_kind(CROSS_DOMAIN_POLICY), "cross-domain-policy");
        assert_eq!(document_kind("<BOARD_ARRIVAL/>"), "BOARD_ARRIVAL");
        assert_eq!(document_kind("<OSCPACKET ADDRESS=\"x\">"), "OSCPACKET");
        assert_eq!(document_kind("no markup"), "");
    }

    #[test]
    fn message_json_shape() {
        let msg = OscMessage::new(
            "/mix",
            vec![OscValue::Int(3), OscValue::from("s"), OscValue::from(vec![0xab])],
        )
        .unwrap();
        let json = serde_json::to_value(MessageOutput::from(&msg)).unwrap();
        assert_eq!(json["address"], "/mix");
        assert_eq!(json["type_tag"], ",isb");
        assert_eq!(json["arguments"][0]["value"], 3);
        assert_eq!(json["arguments"][2]["type"], "b");
        assert_eq!(json["arguments"][2]["value"], "ab");
    }
}
