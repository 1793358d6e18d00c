/// Errors that can occur in bridge and peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error (bind, accept, socket I/O).
    #[error("transport error: {0}")]
    Transport(#[from] oscbridge_transport::TransportError),

    /// XML document error.
    #[error("xml error: {0}")]
    Xml(#[from] oscbridge_xml::XmlError),

    /// OSC wire error.
    #[error("osc error: {0}")]
    Wire(#[from] oscbridge_wire::WireError),

    /// A worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(std::io::Error),

    /// The bridge has been shut down.
    #[error("bridge shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, PeerError>;
