//! OSC codec and OSC-to-XML TCP bridge for embedded control boards.
//!
//! # Crate Structure
//!
//! - [`wire`] : OSC 1.0 binary messages and bundles, plus a text syntax
//! - [`xml`] : XML documents for peers and an incremental parser
//! - [`transport`] : TCP acceptor and peer streams
//! - [`peer`] : the multi-peer bridge (behind `peer` feature)

/// Re-export wire codec types.
pub mod wire {
    pub use oscbridge_wire::*;
}

/// Re-export XML codec types.
pub mod xml {
    pub use oscbridge_xml::*;
}

/// Re-export transport types.
pub mod transport {
    pub use oscbridge_transport::*;
}

/// Re-export bridge types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use oscbridge_peer::*;
}
