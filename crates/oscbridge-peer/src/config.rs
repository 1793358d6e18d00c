use std::net::{IpAddr, Ipv4Addr};

use oscbridge_xml::DEFAULT_MAX_DOCUMENT_SIZE;

/// Default TCP port for XML peers.
pub const DEFAULT_PORT: u16 = 11000;

/// Default number of framed documents buffered per peer.
pub const DEFAULT_OUTBOUND_QUEUE_DEPTH: usize = 1024;

/// Default size of one socket read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024;

/// Bridge runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub bind_address: IpAddr,
    /// Listen port; 0 picks an ephemeral port.
    pub port: u16,
    /// Documents queued for one peer before it is dropped as a slow consumer.
    pub outbound_queue_depth: usize,
    /// Largest inbound document accepted from a peer.
    pub max_document_size: usize,
    pub read_chunk_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            outbound_queue_depth: DEFAULT_OUTBOUND_QUEUE_DEPTH,
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl BridgeConfig {
    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_outbound_queue_depth(mut self, depth: usize) -> Self {
        self.outbound_queue_depth = depth;
        self
    }

    pub fn with_max_document_size(mut self, max: usize) -> Self {
        self.max_document_size = max;
        self
    }
}
