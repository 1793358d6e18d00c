use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::bundle::{TimeTag, BUNDLE_HEADER_SIZE, BUNDLE_TAG};
use crate::error::{Result, WireError};
use crate::message::{OscMessage, OscValue};

/// Sanity ceiling for a single bundle element: 16 KiB.
pub const MAX_BUNDLE_ELEMENT: usize = 16 * 1024;

/// Encoded size of a string of `len` bytes: NUL terminator plus padding to 4.
pub fn padded_size(len: usize) -> usize {
    (len + 4) & !3
}

/// Write an OSC string: bytes, one NUL, then NULs up to a multiple of four.
pub fn write_padded_string(s: &str, dst: &mut BytesMut) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(WireError::InteriorNul);
    }
    let padded = padded_size(s.len());
    dst.reserve(padded);
    dst.put_slice(s.as_bytes());
    dst.put_bytes(0, padded - s.len());
    Ok(())
}

/// Encode one message.
///
/// Wire format:
/// ```text
/// ┌───────────────────┬────────────────────┬───────────────────────────┐
/// │ address, NUL pad  │ ",ifsb", NUL pad   │ arguments, in tag order   │
/// │ (multiple of 4)   │ (multiple of 4)    │ i/f: 4B BE  s: padded     │
/// │                   │                    │ b: 4B BE length + bytes   │
/// └───────────────────┴────────────────────┴───────────────────────────┘
/// ```
///
/// On error nothing is left appended to `dst`.
pub fn encode_message(msg: &OscMessage, dst: &mut BytesMut) -> Result<()> {
    let start = dst.len();
    let result = put_message(msg, dst);
    if result.is_err() {
        dst.truncate(start);
    }
    result
}

fn put_message(msg: &OscMessage, dst: &mut BytesMut) -> Result<()> {
    write_padded_string(msg.address(), dst)?;
    write_padded_string(&msg.type_tag(), dst)?;
    for arg in msg.args() {
        match arg {
            OscValue::Int(i) => dst.put_i32(*i),
            OscValue::Float(f) => dst.put_u32(f.to_bits()),
            OscValue::String(s) => write_padded_string(s, dst)?,
            OscValue::Blob(b) => {
                let len = i32::try_from(b.len()).map_err(|_| WireError::BlobTooLarge(b.len()))?;
                dst.put_i32(len);
                dst.put_slice(b);
            }
        }
    }
    Ok(())
}

/// Encode a packet.
///
/// Zero messages write nothing, one message is written bare, two or more
/// become a bundle: `"#bundle"` + time tag + length-prefixed messages.
pub fn encode_packet(messages: &[OscMessage], time_tag: TimeTag, dst: &mut BytesMut) -> Result<()> {
    match messages {
        [] => Ok(()),
        [single] => encode_message(single, dst),
        many => {
            let start = dst.len();
            let result = put_bundle(many, time_tag, dst);
            if result.is_err() {
                dst.truncate(start);
            }
            result
        }
    }
}

fn put_bundle(messages: &[OscMessage], time_tag: TimeTag, dst: &mut BytesMut) -> Result<()> {
    dst.put_slice(BUNDLE_TAG);
    time_tag.put(dst);
    for msg in messages {
        let len_pos = dst.len();
        dst.put_i32(0);
        put_message(msg, dst)?;
        let size = dst.len() - len_pos - 4;
        if size > MAX_BUNDLE_ELEMENT {
            return Err(WireError::ElementTooLarge {
                size,
                max: MAX_BUNDLE_ELEMENT,
            });
        }
        dst[len_pos..len_pos + 4].copy_from_slice(&(size as i32).to_be_bytes());
    }
    Ok(())
}

/// Convenience: encode a packet into a fresh buffer.
pub fn encode(messages: &[OscMessage]) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    encode_packet(messages, TimeTag::IMMEDIATE, &mut dst)?;
    Ok(dst.freeze())
}

/// Everything that could be extracted from one packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPacket {
    /// Time tag of the outermost bundle, if the packet was a bundle.
    pub time_tag: Option<TimeTag>,
    /// Complete, well-formed messages in packet order, bundles flattened.
    pub messages: Vec<OscMessage>,
    /// Why each dropped element was dropped.
    pub rejected: Vec<WireError>,
}

impl DecodedPacket {
    fn reject(&mut self, err: WireError) {
        warn!(error = %err, "dropping malformed OSC element");
        self.rejected.push(err);
    }
}

/// Decode a packet. Never fails: malformed elements are dropped and
/// recorded in [`DecodedPacket::rejected`], their siblings still decode.
pub fn decode_packet(buf: &[u8]) -> DecodedPacket {
    let mut out = DecodedPacket::default();
    decode_element(buf, true, &mut out);
    out
}

/// Decode a packet, keeping only the messages.
pub fn decode(buf: &[u8]) -> Vec<OscMessage> {
    decode_packet(buf).messages
}

fn decode_element(buf: &[u8], outermost: bool, out: &mut DecodedPacket) {
    match buf.first() {
        Some(b'/') => match decode_message(buf) {
            Ok(msg) => out.messages.push(msg),
            Err(err) => out.reject(err),
        },
        Some(b'#') if buf.starts_with(BUNDLE_TAG) => decode_bundle(buf, outermost, out),
        _ => out.reject(WireError::NotOscPacket),
    }
}

fn decode_bundle(buf: &[u8], outermost: bool, out: &mut DecodedPacket) {
    if buf.len() < BUNDLE_HEADER_SIZE {
        out.reject(WireError::TruncatedBundleHeader {
            available: buf.len(),
        });
        return;
    }

    if outermost {
        let mut tag = [0u8; 8];
        tag.copy_from_slice(&buf[BUNDLE_TAG.len()..BUNDLE_HEADER_SIZE]);
        out.time_tag = Some(TimeTag::from_be_bytes(tag));
    }

    let mut rest = &buf[BUNDLE_HEADER_SIZE..];
    while !rest.is_empty() {
        if rest.len() < 4 {
            out.reject(WireError::TruncatedElementLength {
                available: rest.len(),
            });
            return;
        }
        let length = rest.get_i32();
        if length <= 0 || length as usize > MAX_BUNDLE_ELEMENT || length as usize > rest.len() {
            // Element framing is lost; nothing after this point can be trusted.
            out.reject(WireError::InvalidElementLength {
                length,
                remaining: rest.len(),
                max: MAX_BUNDLE_ELEMENT,
            });
            return;
        }
        let (element, tail) = rest.split_at(length as usize);
        decode_element(element, false, out);
        rest = tail;
    }
}

/// Decode a single message. The message is returned whole or not at all.
pub fn decode_message(buf: &[u8]) -> Result<OscMessage> {
    let (address, addr_len) = read_string(buf)?;

    let tag_start = buf[addr_len..]
        .iter()
        .position(|&b| b == b',')
        .map(|offset| addr_len + offset)
        .ok_or(WireError::NoTypeTag)?;
    let (tag, tag_len) = read_string(&buf[tag_start..])?;

    let declared = tag.len() - 1;
    let mut data = &buf[tag_start + tag_len..];
    let mut args = Vec::with_capacity(declared);
    for kind in tag.chars().skip(1) {
        match decode_argument(kind, &mut data) {
            Ok(value) => args.push(value),
            Err(reason) => {
                return Err(WireError::ArgumentCountMismatch {
                    declared,
                    decoded: args.len(),
                    reason: Box::new(reason),
                })
            }
        }
    }

    OscMessage::new(address, args)
}

/// Read a NUL-terminated string; returns it with the bytes it occupies,
/// padding included. The padding must be present in full.
fn read_string(buf: &[u8]) -> Result<(&str, usize)> {
    let nul = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(WireError::UnterminatedString)?;
    let padded = padded_size(nul);
    if padded > buf.len() {
        return Err(WireError::TruncatedString {
            needed: padded,
            available: buf.len(),
        });
    }
    let s = std::str::from_utf8(&buf[..nul]).map_err(|_| WireError::InvalidUtf8)?;
    Ok((s, padded))
}

fn decode_argument(kind: char, data: &mut &[u8]) -> Result<OscValue> {
    match kind {
        'i' => {
            need(kind, 4, data)?;
            Ok(OscValue::Int(data.get_i32()))
        }
        'f' => {
            need(kind, 4, data)?;
            Ok(OscValue::Float(f32::from_bits(data.get_u32())))
        }
        's' => {
            let (s, consumed) = read_string(data)?;
            let value = OscValue::String(s.to_string());
            data.advance(consumed);
            Ok(value)
        }
        'b' => {
            need(kind, 4, data)?;
            let len = data.get_i32();
            if len < 0 {
                return Err(WireError::NegativeBlobLength(len));
            }
            let len = len as usize;
            need(kind, len, data)?;
            let blob = Bytes::copy_from_slice(&data[..len]);
            data.advance(len);
            Ok(OscValue::Blob(blob))
        }
        other => Err(WireError::UnsupportedTypeTag(other)),
    }
}

fn need(tag: char, needed: usize, data: &[u8]) -> Result<()> {
    if data.len() < needed {
        return Err(WireError::TruncatedArgument {
            tag,
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(address: &str, args: Vec<OscValue>) -> OscMessage {
        OscMessage::new(address, args).unwrap()
    }

    #[test]
    fn test_cut_string_padding_is_rejected() {
        let wire = encode(&[msg("/a", vec![OscValue::from("ab")])]).unwrap();
        assert_eq!(wire.len(), 12);
        assert!(decode(&wire[..11]).is_empty());
        assert!(matches!(
            decode_message(&wire[..11]),
            Err(WireError::ArgumentCountMismatch { reason, .. })
                if matches!(*reason, WireError::TruncatedString { needed: 4, available: 3 })
        ));

        // Address "/abc" needs 8 bytes; only the NUL survives the cut.
        let wire = encode(&[msg("/abc", vec![])]).unwrap();
        assert_eq!(
            decode_message(&wire[..5]),
            Err(WireError::TruncatedString {
                needed: 8,
                available: 5
            })
        );
    }

    #[test]
    fn test_padded_size() {
        assert_eq!(padded_size(0), 4);
        assert_eq!(padded_size(3), 4);
        assert_eq!(padded_size(4), 8);
        assert_eq!(padded_size(7), 8);
    }

    #[test]
    fn test_digitalin_message_bytes() {
        let wire = encode(&[msg("/digitalin/2/value", vec![OscValue::Int(1)])]).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"/digitalin/2/value\0\0");
        expected.extend_from_slice(b",i\0\0");
        expected.extend_from_slice(&[0, 0, 0, 1]);
        assert_eq!(wire.as_ref(), expected.as_slice());

        let decoded = decode(&wire);
        assert_eq!(decoded, vec![msg("/digitalin/2/value", vec![OscValue::Int(1)])]);
    }

    #[test]
    fn test_two_message_bundle_layout() {
        let messages = vec![
            msg("/a", vec![OscValue::Int(1)]),
            msg("/b", vec![OscValue::Float(2.5)]),
        ];
        let wire = encode(&messages).unwrap();

        assert_eq!(&wire[..8], b"#bundle\0");
        assert_eq!(&wire[8..16], &[0u8; 8]);
        // "/a\0\0" ",i\0\0" + int = 12 bytes
        assert_eq!(&wire[16..20], &12i32.to_be_bytes());
        assert_eq!(&wire[20..24], b"/a\0\0");
        assert_eq!(&wire[32..36], &12i32.to_be_bytes());
        assert_eq!(&wire[36..40], b"/b\0\0");
        assert_eq!(&wire[44..48], &2.5f32.to_bits().to_be_bytes());
        assert_eq!(wire.len(), 48);

        let decoded = decode_packet(&wire);
        assert_eq!(decoded.messages, messages);
        assert_eq!(decoded.time_tag, Some(TimeTag::IMMEDIATE));
        assert!(decoded.rejected.is_empty());
    }

    #[test]
    fn test_roundtrip_all_kinds() {
        let original = msg(
            "/roundtrip",
            vec![
                OscValue::Int(-23),
                OscValue::Float(5.6),
                OscValue::from("walrus"),
                OscValue::from(vec![0xde, 0xad, 0xbe, 0xef, 0x01]),
                OscValue::Int(34),
            ],
        );
        let wire = encode(std::slice::from_ref(&original)).unwrap();
        assert_eq!(decode(&wire), vec![original]);
    }

    #[test]
    fn test_blob_is_not_padded() {
        let wire = encode(&[msg("/b", vec![OscValue::from(vec![1u8, 2, 3])])]).unwrap();
        // "/b\0\0" ",b\0\0" + len + 3 bytes
        assert_eq!(wire.len(), 4 + 4 + 4 + 3);
        assert_eq!(&wire[8..12], &3i32.to_be_bytes());
    }

    #[test]
    fn test_empty_packet_encodes_nothing() {
        assert!(encode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_interior_nul_rejected_without_partial_output() {
        let mut dst = BytesMut::from(&b"keep"[..]);
        let bad = msg("/x", vec![OscValue::from("a\0b")]);
        let err = encode_message(&bad, &mut dst).unwrap_err();
        assert_eq!(err, WireError::InteriorNul);
        assert_eq!(dst.as_ref(), b"keep");
    }

    #[test]
    fn test_not_an_osc_packet() {
        let decoded = decode_packet(b"hello");
        assert!(decoded.messages.is_empty());
        assert_eq!(decoded.rejected, vec![WireError::NotOscPacket]);

        let decoded = decode_packet(b"");
        assert_eq!(decoded.rejected, vec![WireError::NotOscPacket]);
    }

    #[test]
    fn test_missing_type_tag_drops_only_that_message() {
        let mut good = BytesMut::new();
        encode_message(&msg("/good", vec![OscValue::Int(7)]), &mut good).unwrap();
        let bad: &[u8] = b"/bad\0\0\0\0";

        let mut wire = BytesMut::new();
        wire.put_slice(BUNDLE_TAG);
        TimeTag::IMMEDIATE.put(&mut wire);
        wire.put_i32(bad.len() as i32);
        wire.put_slice(bad);
        wire.put_i32(good.len() as i32);
        wire.put_slice(&good);

        let decoded = decode_packet(&wire);
        assert_eq!(decoded.messages, vec![msg("/good", vec![OscValue::Int(7)])]);
        assert_eq!(decoded.rejected, vec![WireError::NoTypeTag]);
    }

    #[test]
    fn test_unknown_tag_rejects_message() {
        let mut wire = BytesMut::new();
        wire.put_slice(b"/x\0\0,id\0");
        wire.put_i32(1);
        wire.put_slice(&[0u8; 8]);

        let decoded = decode_packet(&wire);
        assert!(decoded.messages.is_empty());
        assert!(matches!(
            &decoded.rejected[..],
            [WireError::ArgumentCountMismatch { declared: 2, decoded: 1, reason }]
                if **reason == WireError::UnsupportedTypeTag('d')
        ));
    }

    #[test]
    fn test_truncated_argument_rejects_message() {
        let mut wire = BytesMut::new();
        wire.put_slice(b"/x\0\0,ii\0");
        wire.put_i32(1);
        wire.put_slice(&[0, 0]);

        let decoded = decode_packet(&wire);
        assert!(decoded.messages.is_empty());
        assert_eq!(decoded.rejected.len(), 1);
    }

    #[test]
    fn test_oversized_element_length_rejected() {
        let mut wire = BytesMut::new();
        wire.put_slice(BUNDLE_TAG);
        TimeTag::IMMEDIATE.put(&mut wire);
        wire.put_i32((MAX_BUNDLE_ELEMENT + 1) as i32);
        wire.put_bytes(0, MAX_BUNDLE_ELEMENT + 1);

        let decoded = decode_packet(&wire);
        assert!(decoded.messages.is_empty());
        assert!(matches!(
            decoded.rejected[..],
            [WireError::InvalidElementLength { .. }]
        ));
    }

    #[test]
    fn test_zero_and_negative_element_length_rejected() {
        for length in [0i32, -4] {
            let mut wire = BytesMut::new();
            wire.put_slice(BUNDLE_TAG);
            TimeTag::IMMEDIATE.put(&mut wire);
            wire.put_i32(length);
            wire.put_slice(b"/x\0\0,\0\0\0");

            let decoded = decode_packet(&wire);
            assert!(decoded.messages.is_empty());
            assert!(matches!(
                decoded.rejected[..],
                [WireError::InvalidElementLength { length: l, .. }] if l == length
            ));
        }
    }

    #[test]
    fn test_negative_blob_length_rejected() {
        let mut wire = BytesMut::new();
        wire.put_slice(b"/x\0\0,b\0\0");
        wire.put_i32(-1);

        let decoded = decode_packet(&wire);
        assert!(decoded.messages.is_empty());
    }

    #[test]
    fn test_query_message_roundtrip() {
        let query = OscMessage::query("/system/info").unwrap();
        let wire = encode(std::slice::from_ref(&query)).unwrap();
        assert_eq!(wire.as_ref(), b"/system/info\0\0\0\0,\0\0\0");
        assert_eq!(decode(&wire), vec![query]);
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut wire = BytesMut::new();
        wire.put_slice(b"/x\0\0,s\0\0");
        wire.put_slice(&[0xff, 0xfe, 0, 0]);

        let decoded = decode_packet(&wire);
        assert!(decoded.messages.is_empty());
    }

    #[test]
    fn test_element_too_large_on_encode() {
        let big = msg("/big", vec![OscValue::from(vec![0u8; MAX_BUNDLE_ELEMENT])]);
        let small = msg("/small", Vec::new());
        let mut dst = BytesMut::new();
        let err = encode_packet(&[big, small], TimeTag::IMMEDIATE, &mut dst).unwrap_err();
        assert!(matches!(err, WireError::ElementTooLarge { .. }));
        assert!(dst.is_empty());
    }
}
