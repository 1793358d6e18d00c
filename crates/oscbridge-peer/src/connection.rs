use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use bytes::Bytes;
use oscbridge_transport::PeerStream;
use oscbridge_xml::{IncrementalXmlParser, ParserConfig, ParserEvent};
use tracing::{debug, info, warn};

use crate::error::{PeerError, Result};
use crate::event::BridgeEvent;
use crate::registry::PeerRegistry;

/// Bridge-assigned peer identifier, unique for the bridge's lifetime.
pub type PeerId = u64;

/// Lifecycle of one peer connection. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PeerState {
    Connecting = 0,
    Connected = 1,
    Disconnecting = 2,
    Closed = 3,
}

impl PeerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PeerState::Connecting,
            1 => PeerState::Connected,
            2 => PeerState::Disconnecting,
            _ => PeerState::Closed,
        }
    }
}

/// Snapshot of a live peer for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub state: PeerState,
}

/// Settings and shared handles every connection needs.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionContext {
    pub registry: Arc<PeerRegistry>,
    pub events: Sender<BridgeEvent>,
    pub queue_depth: usize,
    pub parser: ParserConfig,
    pub read_chunk_size: usize,
    /// Held while a peer is greeted and registered, and while the dispatcher
    /// broadcasts. A new peer's board list and the broadcasts it receives
    /// therefore never skip a board event.
    pub admission: Arc<Mutex<()>>,
}

/// One accepted TCP peer.
///
/// A reader worker feeds socket bytes to the peer's own XML parser; a writer
/// worker drains the bounded outbound queue. The connection itself only holds
/// the queue sender and a socket handle used to force both workers out.
#[derive(Debug)]
pub struct PeerConnection {
    id: PeerId,
    addr: SocketAddr,
    state: AtomicU8,
    control: PeerStream,
    outbound: Mutex<Option<SyncSender<Bytes>>>,
}

impl PeerConnection {
    pub(crate) fn new(id: PeerId, control: PeerStream, outbound: SyncSender<Bytes>) -> Self {
        Self {
            id,
            addr: control.peer_addr(),
            state: AtomicU8::new(PeerState::Connecting as u8),
            control,
            outbound: Mutex::new(Some(outbound)),
        }
    }

    /// Queue `initial` documents, register, then start both workers.
    pub(crate) fn start(
        id: PeerId,
        stream: PeerStream,
        initial: Vec<Bytes>,
        ctx: &ConnectionContext,
    ) -> Result<Arc<Self>> {
        if let Err(err) = stream.set_nodelay(true) {
            debug!(peer = id, error = %err, "could not disable Nagle");
        }
        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;

        // The first documents must fit without blocking.
        let depth = ctx.queue_depth.max(initial.len()).max(1);
        let (tx, rx) = mpsc::sync_channel(depth);
        for doc in initial {
            tx.try_send(doc).map_err(|_| PeerError::Shutdown)?;
        }

        let conn = Arc::new(Self::new(id, stream, tx));
        conn.set_state(PeerState::Connected);
        ctx.registry.insert(Arc::clone(&conn));

        let spawned = Self::spawn_workers(&conn, reader, writer, rx, ctx);
        if let Err(err) = spawned {
            conn.close();
            ctx.registry.remove(id);
            conn.set_state(PeerState::Closed);
            return Err(err);
        }

        info!(peer = id, addr = %conn.addr, "peer connected");
        Ok(conn)
    }

    fn spawn_workers(
        conn: &Arc<Self>,
        reader: PeerStream,
        writer: PeerStream,
        rx: Receiver<Bytes>,
        ctx: &ConnectionContext,
    ) -> Result<()> {
        let write_conn = Arc::clone(conn);
        thread::Builder::new()
            .name(format!("oscbridge-peer-{}-tx", conn.id))
            .spawn(move || write_conn.write_loop(writer, rx))
            .map_err(PeerError::Spawn)?;

        let read_conn = Arc::clone(conn);
        let parser = IncrementalXmlParser::with_config(ctx.parser.clone());
        let registry = Arc::clone(&ctx.registry);
        let events = ctx.events.clone();
        let chunk_size = ctx.read_chunk_size.max(1);
        thread::Builder::new()
            .name(format!("oscbridge-peer-{}-rx", conn.id))
            .spawn(move || read_conn.read_loop(reader, parser, chunk_size, events, registry))
            .map_err(PeerError::Spawn)?;
        Ok(())
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> PeerState {
        PeerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() <= PeerState::Connected
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id,
            addr: self.addr,
            state: self.state(),
        }
    }

    fn set_state(&self, state: PeerState) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }

    /// Queue a framed document without blocking.
    ///
    /// A full queue means the peer is not keeping up; it is closed. Returns
    /// whether the document was queued.
    pub fn enqueue(&self, doc: Bytes) -> bool {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outbound.as_ref() else {
            return false;
        };
        match tx.try_send(doc) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                drop(outbound);
                warn!(peer = self.id, addr = %self.addr, "outbound queue full, dropping slow peer");
                self.close();
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                drop(outbound);
                self.close();
                false
            }
        }
    }

    /// Begin closing: stop queueing and shut the socket so both workers exit.
    ///
    /// Only the first call has any effect; returns whether this call did it.
    pub fn close(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= PeerState::Disconnecting as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                PeerState::Disconnecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Err(err) = self.control.shutdown() {
            debug!(peer = self.id, error = %err, "socket shutdown failed");
        }
        info!(peer = self.id, addr = %self.addr, "peer disconnected");
        true
    }

    fn read_loop(
        &self,
        mut stream: PeerStream,
        mut parser: IncrementalXmlParser,
        chunk_size: usize,
        events: Sender<BridgeEvent>,
        registry: Arc<PeerRegistry>,
    ) {
        let mut buf = vec![0u8; chunk_size];
        'read: loop {
            let n = match stream.read(&mut buf) {
                Ok(0) => {
                    debug!(peer = self.id, "peer closed its end");
                    break;
                }
                Ok(n) => n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    if self.is_open() {
                        debug!(peer = self.id, error = %err, "peer read failed");
                    }
                    break;
                }
            };

            for event in parser.feed(&buf[..n]) {
                match event {
                    ParserEvent::Packet(packet) => {
                        debug!(
                            peer = self.id,
                            destination = %packet.destination,
                            count = packet.messages.len(),
                            "packet from peer"
                        );
                        let event = BridgeEvent::ClientPacketReceived {
                            peer: self.id,
                            packet,
                        };
                        if events.send(event).is_err() {
                            break 'read;
                        }
                    }
                    ParserEvent::Rejected { error, fragment } => {
                        warn!(
                            peer = self.id,
                            addr = %self.addr,
                            %error,
                            %fragment,
                            "rejected XML document from peer"
                        );
                    }
                }
            }
        }

        self.close();
        registry.remove(self.id);
        self.set_state(PeerState::Closed);
    }

    fn write_loop(&self, mut stream: PeerStream, rx: Receiver<Bytes>) {
        for doc in rx {
            if let Err(err) = stream.write_all(&doc).and_then(|()| stream.flush()) {
                if self.is_open() {
                    debug!(peer = self.id, error = %err, "peer write failed");
                }
                break;
            }
        }
        self.close();
    }
}
