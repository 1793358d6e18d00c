//! XML rendition of OSC traffic for TCP peers.
//!
//! Every document on the wire is terminated by a single NUL byte. Peers
//! receive `OSCPACKET` documents for board traffic and board lifecycle
//! documents (`BOARD_ARRIVAL`, `BOARD_REMOVAL`, `BOARD_INFO`), and send
//! `OSCPACKET` documents addressed to a board.

pub mod board;
pub mod codec;
pub mod error;
pub mod parser;

pub use board::{
    board_arrival_xml, board_info_xml, board_removal_xml, BoardInfo, BoardKind, BOARD,
    BOARD_ARRIVAL, BOARD_INFO, BOARD_REMOVAL,
};
pub use codec::{
    argument_value, decode_hex, encode_hex, frame_document, frame_document_into, messages_to_xml,
    Endpoint, ARGUMENT, CROSS_DOMAIN_POLICY, DOCUMENT_DELIMITER, MESSAGE, OSCPACKET,
};
pub use error::{Result, XmlError};
pub use parser::{
    xml_to_messages, IncrementalXmlParser, InboundPacket, ParserConfig, ParserEvent,
    DEFAULT_MAX_DOCUMENT_SIZE,
};
