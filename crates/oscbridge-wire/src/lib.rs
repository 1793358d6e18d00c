//! OSC 1.0 wire codec.
//!
//! Messages carry an address pattern and `i`/`f`/`s`/`b` arguments. All
//! numbers are big-endian, strings are NUL-terminated and padded to four
//! bytes. A packet holding one message is sent bare; two or more become a
//! `#bundle` with a time tag and length-prefixed elements.
//!
//! Decoding never fails as a whole: malformed elements are dropped and
//! reported, well-formed siblings are kept.

pub mod bundle;
pub mod codec;
pub mod error;
pub mod message;
pub mod text;

pub use bundle::{Bundle, TimeTag, BUNDLE_HEADER_SIZE, BUNDLE_TAG};
pub use codec::{
    decode, decode_message, decode_packet, encode, encode_message, encode_packet, padded_size,
    write_padded_string, DecodedPacket, MAX_BUNDLE_ELEMENT,
};
pub use error::{Result, WireError};
pub use message::{OscMessage, OscValue};
pub use text::{parse_message, parse_messages};
