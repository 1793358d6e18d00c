use bytes::{Buf, Bytes, BytesMut};
use oscbridge_wire::{OscMessage, OscValue};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::codec::{decode_hex, Endpoint, ARGUMENT, DOCUMENT_DELIMITER, MESSAGE, OSCPACKET};
use crate::error::{Result, XmlError};

/// Default limit on the size of one inbound document: 64 KiB.
pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 64 * 1024;

/// Longest fragment excerpt carried in a rejection.
const FRAGMENT_EXCERPT: usize = 256;

/// Configuration for the incremental parser.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Largest document accepted before it is discarded as oversized.
    pub max_document_size: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
        }
    }
}

/// One OSCPACKET document received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPacket {
    /// Board the messages are meant for (ADDRESS and optional PORT).
    pub destination: Endpoint,
    pub messages: Vec<OscMessage>,
}

/// Output of [`IncrementalXmlParser::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserEvent {
    /// A complete OSCPACKET document.
    Packet(InboundPacket),
    /// A document was discarded; parsing restarts with the next fragment.
    Rejected { error: XmlError, fragment: String },
}

/// Reassembles NUL-delimited XML documents from arbitrary byte chunks.
///
/// Only whole tags are handed to the XML reader; a tag split across chunks
/// waits in `pending` until its closing `>` arrives. Element nesting and the
/// partially built packet live here, so a document may span any number of
/// reads.
#[derive(Debug)]
pub struct IncrementalXmlParser {
    config: ParserConfig,
    pending: BytesMut,
    stack: Vec<String>,
    document_bytes: usize,
    destination: Option<Endpoint>,
    current: Option<(String, Vec<OscValue>)>,
    messages: Vec<OscMessage>,
    /// Set after a rejection; input is skipped until the next delimiter.
    discarding: bool,
}

impl Default for IncrementalXmlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalXmlParser {
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            pending: BytesMut::new(),
            stack: Vec::new(),
            document_bytes: 0,
            destination: None,
            current: None,
            messages: Vec::new(),
            discarding: false,
        }
    }

    /// Whether a document has been started but not finished.
    pub fn in_progress(&self) -> bool {
        !self.stack.is_empty() || !self.pending.is_empty()
    }

    /// Feed one chunk as read from the socket.
    ///
    /// Returns every packet completed by this chunk and every document
    /// rejected while reading it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        let mut fragments = chunk.split(|&b| b == DOCUMENT_DELIMITER).peekable();
        while let Some(fragment) = fragments.next() {
            let terminated = fragments.peek().is_some();
            if self.discarding {
                self.discarding = !terminated;
                continue;
            }
            if fragment.is_empty() {
                continue;
            }
            if let Err(error) = self.feed_fragment(fragment, &mut events) {
                debug!(error = %error, "discarding inbound XML document");
                events.push(ParserEvent::Rejected {
                    error,
                    fragment: excerpt(fragment),
                });
                self.reset();
                self.discarding = !terminated;
            }
        }
        events
    }

    /// Drop everything buffered and start fresh on the next data.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.stack.clear();
        self.discarding = false;
        self.reset_document();
    }

    fn reset_document(&mut self) {
        self.document_bytes = 0;
        self.destination = None;
        self.current = None;
        self.messages.clear();
    }

    fn feed_fragment(&mut self, fragment: &[u8], events: &mut Vec<ParserEvent>) -> Result<()> {
        self.document_bytes += fragment.len();
        self.pending.extend_from_slice(fragment);

        let complete = complete_prefix_len(&self.pending);
        if complete > 0 {
            let tags = self.pending.split_to(complete).freeze();
            self.parse_tags(&tags, events)?;
        }

        // Between documents only whitespace may be dropped; anything else starts the next one.
        if self.stack.is_empty() {
            let blank = self
                .pending
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            self.pending.advance(blank);
            self.document_bytes = self.pending.len();
        }

        if self.document_bytes > self.config.max_document_size {
            return Err(XmlError::DocumentTooLarge {
                size: self.document_bytes,
                max: self.config.max_document_size,
            });
        }
        Ok(())
    }

    fn parse_tags(&mut self, tags: &Bytes, events: &mut Vec<ParserEvent>) -> Result<()> {
        let mut reader = Reader::from_reader(tags.as_ref());
        let config = reader.config_mut();
        // End tags may close elements opened by an earlier chunk; nesting is checked here instead.
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.trim_text(true);

        loop {
            let event = reader
                .read_event()
                .map_err(|err| XmlError::Malformed(err.to_string()))?;
            match event {
                Event::Start(start) => self.open(&start)?,
                Event::Empty(start) => {
                    self.open(&start)?;
                    self.close(start.name().as_ref(), events)?;
                }
                Event::End(end) => self.close(end.name().as_ref(), events)?,
                Event::Eof => return Ok(()),
                // Declarations, doctypes, comments and text carry nothing we need.
                _ => {}
            }
        }
    }

    fn open(&mut self, start: &BytesStart<'_>) -> Result<()> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let root = self.stack.first().map(String::as_str);
        let parent = self.stack.last().map(String::as_str);

        match (root, parent, name.as_str()) {
            (None, _, OSCPACKET) => {
                let attrs = read_attributes(start)?;
                self.destination = Some(parse_destination(&attrs)?);
            }
            (None, _, MESSAGE | ARGUMENT) => {
                return Err(violation(format!("{name} outside OSCPACKET")));
            }
            (Some(OSCPACKET), Some(OSCPACKET), MESSAGE) => {
                let attrs = read_attributes(start)?;
                let address = attribute(&attrs, "NAME")
                    .ok_or_else(|| violation("MESSAGE without NAME"))?;
                if !address.starts_with('/') {
                    return Err(violation(format!(
                        "MESSAGE NAME '{address}' must start with '/'"
                    )));
                }
                self.current = Some((address.to_string(), Vec::new()));
            }
            (Some(OSCPACKET), Some(MESSAGE), ARGUMENT) => {
                let attrs = read_attributes(start)?;
                let value = parse_argument(&attrs)?;
                if let Some((_, args)) = self.current.as_mut() {
                    args.push(value);
                }
            }
            (Some(OSCPACKET), _, MESSAGE) => {
                return Err(violation("MESSAGE must be a child of OSCPACKET"));
            }
            (Some(OSCPACKET), _, ARGUMENT) => {
                return Err(violation("ARGUMENT must be a child of MESSAGE"));
            }
            // Other documents (e.g. a policy file request) and unknown elements are skipped.
            _ => {}
        }

        self.stack.push(name);
        Ok(())
    }

    fn close(&mut self, name: &[u8], events: &mut Vec<ParserEvent>) -> Result<()> {
        let name = String::from_utf8_lossy(name);
        match self.stack.pop() {
            Some(open) if open == name => {}
            Some(open) => {
                return Err(XmlError::Malformed(format!(
                    "end tag </{name}> does not match <{open}>"
                )))
            }
            None => {
                return Err(XmlError::Malformed(format!(
                    "end tag </{name}> without a start tag"
                )))
            }
        }

        if name == MESSAGE {
            if let Some((address, args)) = self.current.take() {
                let msg =
                    OscMessage::new(address, args).map_err(|err| violation(err.to_string()))?;
                self.messages.push(msg);
            }
        }

        if self.stack.is_empty() {
            if let Some(destination) = self.destination.take() {
                let messages = std::mem::take(&mut self.messages);
                debug!(%destination, count = messages.len(), "inbound OSCPACKET complete");
                events.push(ParserEvent::Packet(InboundPacket {
                    destination,
                    messages,
                }));
            }
            self.reset_document();
        }
        Ok(())
    }
}

/// Parse one complete OSCPACKET document.
pub fn xml_to_messages(doc: &str) -> Result<InboundPacket> {
    let mut parser = IncrementalXmlParser::with_config(ParserConfig {
        max_document_size: doc.len().max(DEFAULT_MAX_DOCUMENT_SIZE),
    });

    let mut packets = Vec::new();
    for event in parser.feed(doc.as_bytes()) {
        match event {
            ParserEvent::Packet(packet) => packets.push(packet),
            ParserEvent::Rejected { error, .. } => return Err(error),
        }
    }

    if parser.in_progress() || packets.len() != 1 {
        return Err(XmlError::Incomplete);
    }
    packets.pop().ok_or(XmlError::Incomplete)
}

/// Length of the longest prefix that ends right after a complete tag.
///
/// Quoted attribute values may contain `>`; comments and CDATA sections are
/// skipped whole.
fn complete_prefix_len(buf: &[u8]) -> usize {
    let mut end = 0;
    let mut i = 0;
    let mut in_tag = false;
    let mut quote = None;

    while i < buf.len() {
        let b = buf[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
        } else if in_tag {
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => {
                    in_tag = false;
                    end = i + 1;
                }
                _ => {}
            }
        } else if b == b'<' {
            let rest = &buf[i..];
            let section = if rest.starts_with(b"<!--") {
                Some(&b"-->"[..])
            } else if rest.starts_with(b"<![CDATA[") {
                Some(&b"]]>"[..])
            } else {
                None
            };
            match section {
                Some(terminator) => match find(&rest[4..], terminator) {
                    Some(pos) => {
                        i += 4 + pos + terminator.len();
                        end = i;
                        continue;
                    }
                    None => return end,
                },
                None => in_tag = true,
            }
        }
        i += 1;
    }
    end
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn read_attributes(start: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    start
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(|err| XmlError::Malformed(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| XmlError::Malformed(err.to_string()))?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn parse_destination(attrs: &[(String, String)]) -> Result<Endpoint> {
    let address = attribute(attrs, "ADDRESS")
        .filter(|address| !address.is_empty())
        .ok_or_else(|| violation("OSCPACKET without ADDRESS"))?;
    let port = match attribute(attrs, "PORT").map(str::trim) {
        None | Some("") => None,
        Some(port) => Some(
            port.parse::<u16>()
                .map_err(|_| violation(format!("OSCPACKET PORT '{port}' is not a port number")))?,
        ),
    };
    Ok(Endpoint {
        address: address.to_string(),
        port,
    })
}

fn parse_argument(attrs: &[(String, String)]) -> Result<OscValue> {
    let kind = attribute(attrs, "TYPE").ok_or_else(|| violation("ARGUMENT without TYPE"))?;
    let value = attribute(attrs, "VALUE").ok_or_else(|| violation("ARGUMENT without VALUE"))?;

    match kind {
        "i" => value
            .trim()
            .parse::<i32>()
            .map(OscValue::Int)
            .map_err(|_| violation(format!("VALUE '{value}' is not an int32"))),
        "f" => value
            .trim()
            .parse::<f32>()
            .map(OscValue::Float)
            .map_err(|_| violation(format!("VALUE '{value}' is not a float32"))),
        "s" => Ok(OscValue::String(value.to_string())),
        "b" => decode_hex(value.trim())
            .map(|bytes| OscValue::Blob(Bytes::from(bytes)))
            .ok_or_else(|| violation(format!("VALUE '{value}' is not a hex blob"))),
        other => Err(violation(format!("unknown ARGUMENT TYPE '{other}'"))),
    }
}

fn violation(reason: impl Into<String>) -> XmlError {
    XmlError::ProtocolViolation(reason.into())
}

fn excerpt(fragment: &[u8]) -> String {
    let cut = fragment.len().min(FRAGMENT_EXCERPT);
    String::from_utf8_lossy(&fragment[..cut]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKET: &str = "<OSCPACKET ADDRESS=\"192.168.0.200\" PORT=\"10000\" TIME=\"0\">\
        <MESSAGE NAME=\"/appled/0/state\"><ARGUMENT TYPE=\"i\" VALUE=\"1\"/></MESSAGE>\
        <MESSAGE NAME=\"/system/name\"/>\
        </OSCPACKET>";

    fn packets(events: Vec<ParserEvent>) -> Vec<InboundPacket> {
        events
            .into_iter()
            .map(|event| match event {
                ParserEvent::Packet(packet) => packet,
                ParserEvent::Rejected { error, .. } => panic!("unexpected rejection: {error}"),
            })
            .collect()
    }

    #[test]
    fn whole_document_in_one_chunk() {
        let mut parser = IncrementalXmlParser::new();
        let mut chunk = PACKET.as_bytes().to_vec();
        chunk.push(0);

        let got = packets(parser.feed(&chunk));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].destination, Endpoint::with_port("192.168.0.200", 10000));
        assert_eq!(got[0].messages.len(), 2);
        assert_eq!(got[0].messages[0].args(), &[OscValue::Int(1)]);
        assert!(got[0].messages[1].args().is_empty());
        assert!(!parser.in_progress());
    }

    #[test]
    fn document_split_at_every_byte() {
        let mut parser = IncrementalXmlParser::new();
        let mut got = Vec::new();
        for byte in PACKET.as_bytes() {
            got.extend(packets(parser.feed(std::slice::from_ref(byte))));
        }
        got.extend(packets(parser.feed(b"\0")));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].messages[0].address(), "/appled/0/state");
    }

    #[test]
    fn several_documents_in_one_chunk() {
        let mut parser = IncrementalXmlParser::new();
        let chunk = format!("{PACKET}\0{PACKET}\0{}", &PACKET[..20]);
        let got = packets(parser.feed(chunk.as_bytes()));
        assert_eq!(got.len(), 2);
        assert!(parser.in_progress());

        let got = packets(parser.feed(PACKET[20..].as_bytes()));
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn greater_than_inside_attribute_value() {
        let doc = "<OSCPACKET ADDRESS=\"x\"><MESSAGE NAME=\"/s\">\
                   <ARGUMENT TYPE=\"s\" VALUE=\"a>b\"/></MESSAGE></OSCPACKET>";
        let mut parser = IncrementalXmlParser::new();
        let split = doc.find("a>b").unwrap() + 2;
        assert!(parser.feed(doc[..split].as_bytes()).is_empty());
        let got = packets(parser.feed(doc[split..].as_bytes()));
        assert_eq!(got[0].messages[0].args(), &[OscValue::from("a>b")]);
    }

    #[test]
    fn malformed_document_resets_and_recovers() {
        let mut parser = IncrementalXmlParser::new();
        let chunk = format!("<OSCPACKET ADDRESS=\"x\"><MESSAGE NAME=\"/a\"></OSCPACKET>\0{PACKET}\0");
        let events = parser.feed(chunk.as_bytes());
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            ParserEvent::Rejected { error: XmlError::Malformed(_), fragment } if fragment.starts_with("<OSCPACKET")
        ));
        assert!(matches!(&events[1], ParserEvent::Packet(_)));
    }

    #[test]
    fn missing_address_is_a_protocol_violation() {
        let mut parser = IncrementalXmlParser::new();
        let events = parser.feed(b"<OSCPACKET TIME=\"0\"><MESSAGE NAME=\"/a\"/></OSCPACKET>\0");
        assert!(matches!(
            &events[..],
            [ParserEvent::Rejected { error: XmlError::ProtocolViolation(_), .. }]
        ));
        assert!(!parser.in_progress());
    }

    #[test]
    fn argument_type_is_never_inferred() {
        let packet = xml_to_messages(
            "<OSCPACKET ADDRESS=\"x\"><MESSAGE NAME=\"/n\">\
             <ARGUMENT TYPE=\"s\" VALUE=\"12\"/><ARGUMENT TYPE=\"f\" VALUE=\"3\"/>\
             </MESSAGE></OSCPACKET>",
        )
        .unwrap();
        assert_eq!(
            packet.messages[0].args(),
            &[OscValue::from("12"), OscValue::Float(3.0)]
        );
    }

    #[test]
    fn bad_argument_values_rejected() {
        for arg in [
            "<ARGUMENT TYPE=\"i\" VALUE=\"one\"/>",
            "<ARGUMENT TYPE=\"b\" VALUE=\"abc\"/>",
            "<ARGUMENT TYPE=\"x\" VALUE=\"1\"/>",
            "<ARGUMENT TYPE=\"i\"/>",
        ] {
            let doc = format!("<OSCPACKET ADDRESS=\"x\"><MESSAGE NAME=\"/a\">{arg}</MESSAGE></OSCPACKET>");
            assert!(
                matches!(xml_to_messages(&doc), Err(XmlError::ProtocolViolation(_))),
                "{arg}"
            );
        }
    }

    #[test]
    fn policy_request_is_ignored() {
        let mut parser = IncrementalXmlParser::new();
        let events = parser.feed(b"<policy-file-request/>\0");
        assert!(events.is_empty());
        assert!(!parser.in_progress());
    }

    #[test]
    fn declaration_and_comments_are_skipped() {
        let doc = format!("<?xml version=\"1.0\"?>\n<!-- it's a > test -->\n{PACKET}");
        let packet = xml_to_messages(&doc).unwrap();
        assert_eq!(packet.messages.len(), 2);
    }

    #[test]
    fn oversized_document_rejected() {
        let mut parser = IncrementalXmlParser::with_config(ParserConfig {
            max_document_size: 64,
        });
        let events = parser.feed(format!("<OSCPACKET ADDRESS=\"{}\"", "x".repeat(100)).as_bytes());
        assert!(matches!(
            &events[..],
            [ParserEvent::Rejected { error: XmlError::DocumentTooLarge { .. }, .. }]
        ));
        assert!(!parser.in_progress());
    }

    #[test]
    fn whitespace_between_documents_is_not_buffered() {
        let mut parser = IncrementalXmlParser::with_config(ParserConfig {
            max_document_size: 64,
        });
        let blanks = vec![b' '; 8 * 1024];
        for _ in 0..128 {
            assert!(parser.feed(&blanks).is_empty());
        }
        assert!(parser.pending.is_empty());
        assert!(!parser.in_progress());

        let mut parser = IncrementalXmlParser::new();
        let got = packets(parser.feed(format!("{PACKET}\n\r\n{PACKET}\n").as_bytes()));
        assert_eq!(got.len(), 2);
        assert!(parser.pending.is_empty());
    }

    #[test]
    fn text_outside_documents_is_bounded() {
        let mut parser = IncrementalXmlParser::with_config(ParserConfig {
            max_document_size: 64,
        });
        let mut rejected = 0;
        for _ in 0..16 {
            rejected += parser
                .feed(b"no markup here, just text ")
                .iter()
                .filter(|event| matches!(event, ParserEvent::Rejected { error: XmlError::DocumentTooLarge { .. }, .. }))
                .count();
            assert!(parser.pending.len() <= 64);
        }
        assert_eq!(rejected, 1);

        // The rest of the rejected fragment is skipped up to the delimiter.
        let got = packets(parser.feed(b"trailing\0<OSCPACKET ADDRESS=\"x\"/>\0"));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].destination, Endpoint::new("x"));
    }

    #[test]
    fn incomplete_document_is_an_error_for_one_shot_parse() {
        assert_eq!(
            xml_to_messages("<OSCPACKET ADDRESS=\"x\">"),
            Err(XmlError::Incomplete)
        );
    }

    #[test]
    fn prefix_scanner_stops_at_last_complete_tag() {
        assert_eq!(complete_prefix_len(b"<a><b"), 3);
        assert_eq!(complete_prefix_len(b"<a x=\">\">"), 9);
        assert_eq!(complete_prefix_len(b"<a/><!-- > "), 4);
        assert_eq!(complete_prefix_len(b"text only"), 0);
    }
}
