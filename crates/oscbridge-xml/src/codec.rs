use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use oscbridge_wire::{OscMessage, OscValue};
use quick_xml::events::BytesStart;

/// Byte that terminates every document on the wire.
pub const DOCUMENT_DELIMITER: u8 = 0;

/// Policy document sent first to every new peer; allows any origin.
pub const CROSS_DOMAIN_POLICY: &str = concat!(
    "<?xml version=\"1.0\"?>",
    "<!DOCTYPE cross-domain-policy SYSTEM ",
    "\"http://www.macromedia.com/xml/dtds/cross-domain-policy.dtd\">",
    "<cross-domain-policy>",
    "<allow-access-from domain=\"*\" />",
    "</cross-domain-policy>"
);

pub const OSCPACKET: &str = "OSCPACKET";
pub const MESSAGE: &str = "MESSAGE";
pub const ARGUMENT: &str = "ARGUMENT";

/// Where a packet came from, or which board it is meant for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Board location: an IP address or a serial device key.
    pub address: String,
    /// UDP port, when the board is reached over the network.
    pub port: Option<u16>,
}

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: None,
        }
    }

    pub fn with_port(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port: Some(port),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.address, port),
            None => f.write_str(&self.address),
        }
    }
}

/// Render messages as one OSCPACKET document.
///
/// ```text
/// <OSCPACKET ADDRESS="192.168.0.200" TIME="0">
///   <MESSAGE NAME="/analogin/0/value"><ARGUMENT TYPE="i" VALUE="512"/></MESSAGE>
/// </OSCPACKET>
/// ```
pub fn messages_to_xml(messages: &[OscMessage], source: &Endpoint) -> String {
    let mut doc = DocumentBuilder::with_capacity(64 + messages.len() * 64);
    let port = source.port.map(|port| port.to_string());
    let mut attrs = vec![("ADDRESS", source.address.as_str())];
    if let Some(port) = port.as_deref() {
        attrs.push(("PORT", port));
    }
    attrs.push(("TIME", "0"));
    doc.open(OSCPACKET, &attrs);

    for msg in messages {
        let name = [("NAME", msg.address())];
        if msg.args().is_empty() {
            doc.empty(MESSAGE, &name);
            continue;
        }
        doc.open(MESSAGE, &name);
        for arg in msg.args() {
            let tag = arg.type_tag().to_string();
            let value = argument_value(arg);
            doc.empty(ARGUMENT, &[("TYPE", tag.as_str()), ("VALUE", value.as_str())]);
        }
        doc.close(MESSAGE);
    }

    doc.close(OSCPACKET);
    doc.finish()
}

/// The VALUE attribute text for one argument.
pub fn argument_value(arg: &OscValue) -> String {
    match arg {
        OscValue::Int(i) => i.to_string(),
        // Shortest text that parses back to the same f32.
        OscValue::Float(f) => f.to_string(),
        OscValue::String(s) => s.clone(),
        OscValue::Blob(b) => encode_hex(b),
    }
}

/// Append a document and its NUL delimiter.
pub fn frame_document_into(doc: &str, dst: &mut BytesMut) {
    dst.reserve(doc.len() + 1);
    dst.put_slice(doc.as_bytes());
    dst.put_u8(DOCUMENT_DELIMITER);
}

/// A document plus its NUL delimiter, ready to write to any number of peers.
pub fn frame_document(doc: &str) -> Bytes {
    let mut dst = BytesMut::new();
    frame_document_into(doc, &mut dst);
    dst.freeze()
}

/// Lowercase hex nibble pairs, two characters per byte.
pub fn encode_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

/// Inverse of [`encode_hex`]; accepts either case. `None` on odd length or a non-hex digit.
pub fn decode_hex(text: &str) -> Option<Vec<u8>> {
    let text = text.as_bytes();
    if text.len() % 2 != 0 {
        return None;
    }
    text.chunks_exact(2)
        .map(|pair| Some((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Appends tags to one document. Start tags and attribute escaping come
/// from quick-xml's [`BytesStart`].
pub(crate) struct DocumentBuilder {
    buf: Vec<u8>,
}

impl DocumentBuilder {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn open(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.start_tag(name, attrs);
        self.buf.push(b'>');
    }

    pub(crate) fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.start_tag(name, attrs);
        self.buf.extend_from_slice(b"/>");
    }

    pub(crate) fn close(&mut self, name: &str) {
        self.buf.extend_from_slice(b"</");
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(b'>');
    }

    fn start_tag(&mut self, name: &str, attrs: &[(&str, &str)]) {
        let mut tag = BytesStart::new(name);
        tag.extend_attributes(attrs.iter().copied());
        self.buf.push(b'<');
        self.buf.extend_from_slice(&tag);
    }

    /// Every name and value went in as `&str`, so the buffer is UTF-8.
    pub(crate) fn finish(self) -> String {
        String::from_utf8(self.buf)
            .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
    }
}
