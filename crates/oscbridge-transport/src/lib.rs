//! TCP plumbing for the bridge.
//!
//! [`TcpAcceptor`] owns the listening socket and hands out [`PeerStream`]s.
//! Everything above this layer reads and writes peers through
//! [`PeerStream`] only.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::PeerStream;
pub use tcp::{connect, TcpAcceptor};
