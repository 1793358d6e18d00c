/// Errors raised while reading XML bridge documents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmlError {
    /// The document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Malformed(String),

    /// The document is well-formed but breaks the OSCPACKET schema.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// An incomplete document grew past the configured limit.
    #[error("document too large ({size} bytes, max {max})")]
    DocumentTooLarge { size: usize, max: usize },

    /// Input did not contain exactly one complete OSCPACKET document.
    #[error("no complete OSCPACKET document in input")]
    Incomplete,
}

pub type Result<T> = std::result::Result<T, XmlError>;
