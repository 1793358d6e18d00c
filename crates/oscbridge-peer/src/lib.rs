//! Multi-peer TCP bridge between OSC boards and XML clients.
//!
//! A [`Bridge`] accepts TCP peers, greets each with the cross-domain policy
//! and the current board list, broadcasts board traffic to every peer as XML,
//! and forwards the packets peers send to a [`BoardTransport`].

pub mod board;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod registry;

pub use board::{BoardRegistry, BoardTransport, StaticBoards};
pub use bridge::Bridge;
pub use config::{
    BridgeConfig, DEFAULT_OUTBOUND_QUEUE_DEPTH, DEFAULT_PORT, DEFAULT_READ_CHUNK_SIZE,
};
pub use connection::{PeerConnection, PeerId, PeerInfo, PeerState};
pub use error::{PeerError, Result};
pub use event::{BridgeEvent, BridgeHandle};
pub use registry::PeerRegistry;
