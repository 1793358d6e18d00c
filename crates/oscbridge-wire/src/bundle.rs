use bytes::{BufMut, BytesMut};

use crate::codec::{decode_packet, encode_packet};
use crate::error::Result;
use crate::message::OscMessage;

/// Bundle tag string, NUL included.
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Bundle header: tag (8) + time tag (8) = 16 bytes.
pub const BUNDLE_HEADER_SIZE: usize = 16;

/// An OSC time tag, carried opaquely as two big-endian words.
///
/// The bridge never schedules against it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TimeTag {
    pub seconds: u32,
    pub fraction: u32,
}

impl TimeTag {
    /// The all-zero tag used for freshly built bundles.
    pub const IMMEDIATE: TimeTag = TimeTag {
        seconds: 0,
        fraction: 0,
    };

    pub fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    pub(crate) fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self {
            seconds: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            fraction: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    pub(crate) fn put(&self, dst: &mut BytesMut) {
        dst.put_u32(self.seconds);
        dst.put_u32(self.fraction);
    }
}

/// An ordered list of messages sharing one time tag.
///
/// Nested bundles are flattened on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    pub time_tag: TimeTag,
    pub messages: Vec<OscMessage>,
}

impl Bundle {
    pub fn new(messages: Vec<OscMessage>) -> Self {
        Self {
            time_tag: TimeTag::IMMEDIATE,
            messages,
        }
    }

    pub fn with_time_tag(time_tag: TimeTag, messages: Vec<OscMessage>) -> Self {
        Self { time_tag, messages }
    }

    /// Encode as a packet. A single message is written bare, without a bundle wrapper.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_packet(&self.messages, self.time_tag, dst)
    }

    /// Decode whatever complete messages `buf` holds.
    ///
    /// A bare message decodes to a bundle with the immediate time tag.
    pub fn decode(buf: &[u8]) -> Self {
        let decoded = decode_packet(buf);
        Self {
            time_tag: decoded.time_tag.unwrap_or(TimeTag::IMMEDIATE),
            messages: decoded.messages,
        }
    }
}
