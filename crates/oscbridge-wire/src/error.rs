/// Errors produced while encoding or decoding OSC packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The packet starts with neither '/' (message) nor "#bundle".
    #[error("not an OSC packet")]
    NotOscPacket,

    /// The buffer is shorter than the 16-byte bundle header.
    #[error("truncated bundle header ({available} bytes, need 16)")]
    TruncatedBundleHeader { available: usize },

    /// A bundle element length is non-positive, insane, or overruns the buffer.
    #[error("invalid bundle element length {length} ({remaining} bytes remaining, max {max})")]
    InvalidElementLength {
        length: i32,
        remaining: usize,
        max: usize,
    },

    /// Fewer than four bytes remain where a bundle element length is expected.
    #[error("truncated bundle element length ({available} bytes remaining)")]
    TruncatedElementLength { available: usize },

    /// An encoded bundle element would exceed the decoder's sanity ceiling.
    #[error("bundle element too large ({size} bytes, max {max})")]
    ElementTooLarge { size: usize, max: usize },

    /// A string ran off the end of the buffer without a NUL terminator.
    #[error("unterminated string")]
    UnterminatedString,

    /// A string's NUL padding runs past the end of the buffer.
    #[error("truncated string padding ({needed} bytes needed, {available} available)")]
    TruncatedString { needed: usize, available: usize },

    /// The message carries no ',' type tag string.
    #[error("no type tag")]
    NoTypeTag,

    /// The type tag names an argument kind this codec does not carry.
    #[error("unsupported type tag '{0}'")]
    UnsupportedTypeTag(char),

    /// The argument data ended before the type tag was satisfied.
    #[error("truncated '{tag}' argument ({needed} bytes needed, {available} available)")]
    TruncatedArgument {
        tag: char,
        needed: usize,
        available: usize,
    },

    /// Fewer arguments were decoded than the type tag declares.
    #[error("type tag declares {declared} arguments but {decoded} were decoded: {reason}")]
    ArgumentCountMismatch {
        declared: usize,
        decoded: usize,
        reason: Box<WireError>,
    },

    /// A blob declares a negative length.
    #[error("negative blob length {0}")]
    NegativeBlobLength(i32),

    /// An address or string argument is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// The address pattern does not start with '/'.
    #[error("invalid address pattern '{0}' (must start with '/')")]
    InvalidAddress(String),

    /// A string to encode contains a NUL byte.
    #[error("string contains an interior NUL byte")]
    InteriorNul,

    /// A blob is too large for its int32 length prefix.
    #[error("blob too large ({0} bytes)")]
    BlobTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, WireError>;
