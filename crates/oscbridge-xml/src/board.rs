//! Board lifecycle documents: BOARD_INFO, BOARD_ARRIVAL, BOARD_REMOVAL.

use std::fmt;

use crate::codec::DocumentBuilder;

pub const BOARD_INFO: &str = "BOARD_INFO";
pub const BOARD_ARRIVAL: &str = "BOARD_ARRIVAL";
pub const BOARD_REMOVAL: &str = "BOARD_REMOVAL";
pub const BOARD: &str = "BOARD";

/// How a board is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardKind {
    UsbSerial,
    Ethernet,
}

impl BoardKind {
    /// TYPE attribute value in BOARD_ARRIVAL documents.
    pub fn as_xml(self) -> &'static str {
        match self {
            BoardKind::UsbSerial => "USB",
            BoardKind::Ethernet => "Ethernet",
        }
    }
}

impl fmt::Display for BoardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_xml())
    }
}

/// What the bridge knows about one attached board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoardInfo {
    /// Unique key: IP address for Ethernet boards, device path for USB.
    pub location: String,
    pub name: String,
    pub serial_number: String,
    pub kind: BoardKind,
}

impl BoardInfo {
    pub fn new(location: impl Into<String>, kind: BoardKind) -> Self {
        Self {
            location: location.into(),
            name: String::new(),
            serial_number: String::new(),
            kind,
        }
    }
}

/// `<BOARD_INFO><BOARD LOCATION=".." NAME=".." SERIALNUMBER=".."/></BOARD_INFO>`
pub fn board_info_xml(board: &BoardInfo) -> String {
    let mut doc = DocumentBuilder::with_capacity(128);
    doc.open(BOARD_INFO, &[]);
    doc.empty(
        BOARD,
        &[
            ("LOCATION", board.location.as_str()),
            ("NAME", board.name.as_str()),
            ("SERIALNUMBER", board.serial_number.as_str()),
        ],
    );
    doc.close(BOARD_INFO);
    doc.finish()
}

/// One BOARD element per board, each with TYPE and LOCATION.
pub fn board_arrival_xml(boards: &[BoardInfo]) -> String {
    board_list_xml(BOARD_ARRIVAL, boards, true)
}

/// One BOARD element per board, each with LOCATION.
pub fn board_removal_xml(boards: &[BoardInfo]) -> String {
    board_list_xml(BOARD_REMOVAL, boards, false)
}

fn board_list_xml(root: &str, boards: &[BoardInfo], with_kind: bool) -> String {
    let mut doc = DocumentBuilder::with_capacity(32 + boards.len() * 48);
    if boards.is_empty() {
        doc.empty(root, &[]);
        return doc.finish();
    }
    doc.open(root, &[]);
    for board in boards {
        let mut attrs = Vec::with_capacity(2);
        if with_kind {
            attrs.push(("TYPE", board.kind.as_xml()));
        }
        attrs.push(("LOCATION", board.location.as_str()));
        doc.empty(BOARD, &attrs);
    }
    doc.close(root);
    doc.finish()
}
