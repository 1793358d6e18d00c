use std::sync::mpsc::Sender;

use oscbridge_wire::{decode_packet, OscMessage};
use oscbridge_xml::{BoardInfo, Endpoint, InboundPacket};
use tracing::warn;

use crate::connection::PeerId;
use crate::error::{PeerError, Result};

/// Everything the dispatcher acts on, in posting order.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    BoardArrived(Vec<BoardInfo>),
    BoardRemoved(Vec<BoardInfo>),
    BoardInfoChanged(BoardInfo),
    /// Messages received from a board, to be broadcast to every peer.
    OscPacketReceived {
        source: Endpoint,
        messages: Vec<OscMessage>,
    },
    /// A peer sent a packet for a board.
    ClientPacketReceived { peer: PeerId, packet: InboundPacket },
    /// Stop the dispatcher.
    Shutdown,
}

/// Cloneable entry point for board-side events.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    events: Sender<BridgeEvent>,
}

impl BridgeHandle {
    pub(crate) fn new(events: Sender<BridgeEvent>) -> Self {
        Self { events }
    }

    pub fn post(&self, event: BridgeEvent) -> Result<()> {
        self.events.send(event).map_err(|_| PeerError::Shutdown)
    }

    pub fn board_arrived(&self, boards: Vec<BoardInfo>) -> Result<()> {
        self.post(BridgeEvent::BoardArrived(boards))
    }

    pub fn board_removed(&self, boards: Vec<BoardInfo>) -> Result<()> {
        self.post(BridgeEvent::BoardRemoved(boards))
    }

    pub fn board_info_changed(&self, board: BoardInfo) -> Result<()> {
        self.post(BridgeEvent::BoardInfoChanged(board))
    }

    /// Decode raw OSC bytes from a board and broadcast what survives.
    ///
    /// Malformed elements are logged and skipped. Returns how many messages
    /// were posted.
    pub fn board_packet(&self, source: Endpoint, packet: &[u8]) -> Result<usize> {
        let decoded = decode_packet(packet);
        if !decoded.rejected.is_empty() {
            warn!(%source, dropped = decoded.rejected.len(), "board packet partly malformed");
        }
        let count = decoded.messages.len();
        if count > 0 {
            self.post(BridgeEvent::OscPacketReceived {
                source,
                messages: decoded.messages,
            })?;
        }
        Ok(count)
    }
}
