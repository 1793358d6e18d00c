use std::fmt;

use bytes::Bytes;

use crate::error::{Result, WireError};

/// A single OSC argument.
#[derive(Debug, Clone)]
pub enum OscValue {
    /// `i`: 32-bit signed integer.
    Int(i32),
    /// `f`: 32-bit IEEE float.
    Float(f32),
    /// `s`: UTF-8 string without NUL bytes.
    String(String),
    /// `b`: opaque byte payload.
    Blob(Bytes),
}

impl OscValue {
    /// The type tag letter for this argument.
    pub fn type_tag(&self) -> char {
        match self {
            OscValue::Int(_) => 'i',
            OscValue::Float(_) => 'f',
            OscValue::String(_) => 's',
            OscValue::Blob(_) => 'b',
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            OscValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            OscValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            OscValue::Blob(b) => Some(b),
            _ => None,
        }
    }
}

// Floats compare by bit pattern: the codec promises bit-exact transport.
impl PartialEq for OscValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OscValue::Int(a), OscValue::Int(b)) => a == b,
            (OscValue::Float(a), OscValue::Float(b)) => a.to_bits() == b.to_bits(),
            (OscValue::String(a), OscValue::String(b)) => a == b,
            (OscValue::Blob(a), OscValue::Blob(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for OscValue {}

impl From<i32> for OscValue {
    fn from(value: i32) -> Self {
        OscValue::Int(value)
    }
}

impl From<f32> for OscValue {
    fn from(value: f32) -> Self {
        OscValue::Float(value)
    }
}

impl From<&str> for OscValue {
    fn from(value: &str) -> Self {
        OscValue::String(value.to_string())
    }
}

impl From<String> for OscValue {
    fn from(value: String) -> Self {
        OscValue::String(value)
    }
}

impl From<Bytes> for OscValue {
    fn from(value: Bytes) -> Self {
        OscValue::Blob(value)
    }
}

impl From<Vec<u8>> for OscValue {
    fn from(value: Vec<u8>) -> Self {
        OscValue::Blob(Bytes::from(value))
    }
}

impl fmt::Display for OscValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscValue::Int(i) => write!(f, "{i}"),
            OscValue::Float(v) => write!(f, "{v}"),
            OscValue::String(s) => write!(f, "{s}"),
            OscValue::Blob(b) => {
                f.write_str("[ ")?;
                for byte in b.iter() {
                    write!(f, "{byte:x} ")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// An OSC message: an address pattern plus ordered arguments.
///
/// Immutable once built. The address always starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscMessage {
    address: String,
    args: Vec<OscValue>,
}

impl OscMessage {
    /// Build a message, validating the address pattern.
    pub fn new(address: impl Into<String>, args: Vec<OscValue>) -> Result<Self> {
        let address = address.into();
        if !address.starts_with('/') {
            return Err(WireError::InvalidAddress(address));
        }
        Ok(Self { address, args })
    }

    /// Build a message with no arguments (a property query).
    pub fn query(address: impl Into<String>) -> Result<Self> {
        Self::new(address, Vec::new())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn args(&self) -> &[OscValue] {
        &self.args
    }

    /// The full type tag string, including the leading ','.
    pub fn type_tag(&self) -> String {
        let mut tag = String::with_capacity(self.args.len() + 1);
        tag.push(',');
        tag.extend(self.args.iter().map(OscValue::type_tag));
        tag
    }

    pub fn into_parts(self) -> (String, Vec<OscValue>) {
        (self.address, self.args)
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_address_without_slash() {
        let err = OscMessage::new("led/0", Vec::new()).unwrap_err();
        assert_eq!(err, WireError::InvalidAddress("led/0".to_string()));
    }

    #[test]
    fn type_tag_follows_arguments() {
        let msg = OscMessage::new(
            "/x",
            vec![
                OscValue::Int(1),
                OscValue::Float(2.0),
                OscValue::from("s"),
                OscValue::from(vec![1u8]),
            ],
        )
        .unwrap();
        assert_eq!(msg.type_tag(), ",ifsb");
    }

    #[test]
    fn query_has_empty_type_tag() {
        let msg = OscMessage::query("/appled/0/state").unwrap();
        assert!(msg.args().is_empty());
        assert_eq!(msg.type_tag(), ",");
    }

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(OscValue::Float(f32::NAN), OscValue::Float(f32::NAN));
        assert_ne!(OscValue::Float(0.0), OscValue::Float(-0.0));
    }

    #[test]
    fn display_renders_all_kinds() {
        let msg = OscMessage::new(
            "/dump",
            vec![
                OscValue::Int(-3),
                OscValue::Float(2.5),
                OscValue::from("word"),
                OscValue::from(vec![0xde, 0x0a]),
            ],
        )
        .unwrap();
        assert_eq!(msg.to_string(), "/dump -3 2.5 word [ de a ]");
    }
}
