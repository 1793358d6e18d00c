//! Collaborators the bridge talks to on the board side.

use std::sync::RwLock;

use bytes::Bytes;
use oscbridge_xml::{BoardInfo, Endpoint};

/// Source of the current board list, sent to every peer on connect.
pub trait BoardRegistry: Send + Sync {
    fn connected_boards(&self) -> Vec<BoardInfo>;
}

/// Delivers encoded OSC packets to a board.
pub trait BoardTransport: Send + Sync {
    /// Send `packet` to the board at `destination`.
    fn deliver(&self, destination: &Endpoint, packet: Bytes) -> std::io::Result<()>;
}

impl<F> BoardTransport for F
where
    F: Fn(&Endpoint, Bytes) -> std::io::Result<()> + Send + Sync,
{
    fn deliver(&self, destination: &Endpoint, packet: Bytes) -> std::io::Result<()> {
        self(destination, packet)
    }
}

/// A board list kept in memory, keyed by location.
#[derive(Debug, Default)]
pub struct StaticBoards {
    boards: RwLock<Vec<BoardInfo>>,
}

impl StaticBoards {
    pub fn new(boards: Vec<BoardInfo>) -> Self {
        Self {
            boards: RwLock::new(boards),
        }
    }

    /// Add or replace the board with the same location.
    pub fn insert(&self, board: BoardInfo) {
        let mut boards = self.boards.write().unwrap_or_else(|e| e.into_inner());
        match boards.iter_mut().find(|b| b.location == board.location) {
            Some(existing) => *existing = board,
            None => boards.push(board),
        }
    }

    pub fn remove(&self, location: &str) -> Option<BoardInfo> {
        let mut boards = self.boards.write().unwrap_or_else(|e| e.into_inner());
        let index = boards.iter().position(|b| b.location == location)?;
        Some(boards.remove(index))
    }
}

impl BoardRegistry for StaticBoards {
    fn connected_boards(&self) -> Vec<BoardInfo> {
        self.boards
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use oscbridge_xml::BoardKind;

    use super::*;

    #[test]
    fn insert_replaces_by_location() {
        let boards = StaticBoards::default();
        boards.insert(BoardInfo::new("/dev/ttyACM0", BoardKind::UsbSerial));
        let mut renamed = BoardInfo::new("/dev/ttyACM0", BoardKind::UsbSerial);
        renamed.name = "left".to_string();
        boards.insert(renamed);

        let listed = boards.connected_boards();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "left");
    }

    #[test]
    fn remove_unknown_location() {
        let boards = StaticBoards::new(vec![BoardInfo::new("10.0.0.5", BoardKind::Ethernet)]);
        assert!(boards.remove("10.0.0.6").is_none());
        assert!(boards.remove("10.0.0.5").is_some());
        assert!(boards.connected_boards().is_empty());
    }

    #[test]
    fn closures_are_transports() {
        let transport = |destination: &Endpoint, packet: Bytes| {
            assert_eq!(destination.address, "10.0.0.5");
            assert_eq!(packet.len(), 4);
            Ok::<(), std::io::Error>(())
        };
        transport
            .deliver(&Endpoint::new("10.0.0.5"), Bytes::from_static(b"/a\0\0"))
            .expect("closure transport should deliver");
    }
}
