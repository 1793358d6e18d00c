use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use oscbridge_transport::{PeerStream, TcpAcceptor, TransportError};
use oscbridge_wire::encode;
use oscbridge_xml::{
    board_arrival_xml, board_info_xml, board_removal_xml, frame_document, messages_to_xml,
    InboundPacket, ParserConfig, CROSS_DOMAIN_POLICY,
};
use tracing::{debug, info, warn};

use crate::board::{BoardRegistry, BoardTransport};
use crate::config::BridgeConfig;
use crate::connection::{ConnectionContext, PeerConnection, PeerId, PeerInfo};
use crate::error::{PeerError, Result};
use crate::event::{BridgeEvent, BridgeHandle};
use crate::registry::PeerRegistry;

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Relays board traffic to XML peers over TCP, and peer packets to boards.
///
/// Workers:
///
/// ```text
///   acceptor ──► PeerConnection (reader + writer per peer)
///                      │ ClientPacketReceived
///   BridgeHandle ──────┼──────────► dispatcher ──► BoardTransport::deliver
///     board events     │                 │
///                      └─────────────────┴──► PeerRegistry::broadcast
/// ```
///
/// All board-originated events go through the one dispatcher, so every peer
/// sees them in posting order.
pub struct Bridge {
    config: BridgeConfig,
    ctx: ConnectionContext,
    boards: Arc<dyn BoardRegistry>,
    next_peer_id: Arc<AtomicU64>,
    listener: Mutex<Option<Listener>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

/// The current acceptor and the worker blocked on it.
struct Listener {
    acceptor: Arc<TcpAcceptor>,
    worker: JoinHandle<()>,
}

impl Listener {
    fn stop(self) {
        self.acceptor.unblock();
        if self.worker.join().is_err() {
            warn!("acceptor worker panicked");
        }
    }
}

impl Bridge {
    /// Bind the listen socket and start the acceptor and dispatcher workers.
    pub fn start(
        config: BridgeConfig,
        boards: Arc<dyn BoardRegistry>,
        transport: Arc<dyn BoardTransport>,
    ) -> Result<Self> {
        let acceptor = TcpAcceptor::bind(SocketAddr::new(config.bind_address, config.port))?;

        let (events, rx) = mpsc::channel();
        let registry = Arc::new(PeerRegistry::new());
        let admission = Arc::new(Mutex::new(()));
        let ctx = ConnectionContext {
            registry: Arc::clone(&registry),
            events,
            queue_depth: config.outbound_queue_depth,
            parser: ParserConfig {
                max_document_size: config.max_document_size,
            },
            read_chunk_size: config.read_chunk_size,
            admission: Arc::clone(&admission),
        };

        let dispatcher = thread::Builder::new()
            .name("oscbridge-dispatch".to_string())
            .spawn(move || dispatch_loop(rx, registry, admission, transport))
            .map_err(PeerError::Spawn)?;

        let bridge = Self {
            config,
            ctx,
            boards,
            next_peer_id: Arc::new(AtomicU64::new(1)),
            listener: Mutex::new(None),
            dispatcher: Mutex::new(Some(dispatcher)),
            shut_down: AtomicBool::new(false),
        };

        match bridge.spawn_listener(Arc::new(acceptor)) {
            Ok(listener) => {
                *bridge.listener_slot() = Some(listener);
                Ok(bridge)
            }
            Err(err) => {
                bridge.shutdown();
                Err(err)
            }
        }
    }

    fn listener_slot(&self) -> std::sync::MutexGuard<'_, Option<Listener>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_listener(&self, acceptor: Arc<TcpAcceptor>) -> Result<Listener> {
        let port = acceptor.port();
        let worker_acceptor = Arc::clone(&acceptor);
        let ctx = self.ctx.clone();
        let boards = Arc::clone(&self.boards);
        let next_peer_id = Arc::clone(&self.next_peer_id);
        let worker = thread::Builder::new()
            .name(format!("oscbridge-accept-{port}"))
            .spawn(move || accept_loop(&worker_acceptor, &ctx, boards.as_ref(), &next_peer_id))
            .map_err(PeerError::Spawn)?;
        Ok(Listener { acceptor, worker })
    }

    /// Handle for posting board-side events.
    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle::new(self.ctx.events.clone())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Address currently accepting peers.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener_slot()
            .as_ref()
            .map(|listener| listener.acceptor.local_addr())
    }

    /// Port currently accepting peers, 0 after shutdown.
    pub fn listen_port(&self) -> u16 {
        self.local_addr().map_or(0, |addr| addr.port())
    }

    /// Move the listener to `port`.
    ///
    /// The new port is bound before the old listener stops. If binding fails
    /// the error is returned and the old listener keeps running. Connected
    /// peers are unaffected either way.
    pub fn set_listen_port(&self, port: u16) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(PeerError::Shutdown);
        }

        let mut slot = self.listener_slot();
        let old_port = slot.as_ref().map(|l| l.acceptor.port());
        if old_port == Some(port) {
            debug!(port, "listen port unchanged");
            return Ok(());
        }

        let acceptor = match TcpAcceptor::bind(SocketAddr::new(self.config.bind_address, port)) {
            Ok(acceptor) => Arc::new(acceptor),
            Err(err) => {
                warn!(port, error = %err, "cannot move listener; keeping current port");
                return Err(err.into());
            }
        };
        let new_port = acceptor.port();
        let listener = self.spawn_listener(acceptor)?;
        if let Some(old) = slot.replace(listener) {
            old.stop();
        }

        info!(?old_port, new_port, "listen port changed");
        Ok(())
    }

    pub fn peer_count(&self) -> usize {
        self.ctx.registry.len()
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.ctx.registry.infos()
    }

    /// Force one peer closed. Returns false for an unknown id.
    pub fn disconnect_peer(&self, id: PeerId) -> bool {
        match self.ctx.registry.get(id) {
            Some(peer) => {
                peer.close();
                true
            }
            None => false,
        }
    }

    /// Queue a framed document to every live peer. Returns how many took it.
    pub fn broadcast(&self, doc: &Bytes) -> usize {
        self.ctx.registry.broadcast(doc)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop accepting, close every peer and stop the dispatcher. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let listener = self.listener_slot().take();
        if let Some(listener) = listener {
            listener.stop();
        }

        self.ctx.registry.close_all();

        let _ = self.ctx.events.send(BridgeEvent::Shutdown);
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dispatcher) = dispatcher {
            if dispatcher.join().is_err() {
                warn!("dispatcher worker panicked");
            }
        }
        info!("bridge shut down");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("listen_port", &self.listen_port())
            .field("peers", &self.peer_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn accept_loop(
    acceptor: &TcpAcceptor,
    ctx: &ConnectionContext,
    boards: &dyn BoardRegistry,
    next_peer_id: &AtomicU64,
) {
    loop {
        match acceptor.accept() {
            Ok(stream) => {
                let id = next_peer_id.fetch_add(1, Ordering::Relaxed);
                if let Err(err) = admit(id, stream, ctx, boards) {
                    warn!(peer = id, error = %err, "failed to start peer");
                }
            }
            Err(TransportError::Shutdown) => break,
            Err(err) => {
                if acceptor.is_closed() {
                    break;
                }
                warn!(error = %err, "accept failed");
                thread::sleep(ACCEPT_RETRY_DELAY);
            }
        }
    }
    debug!(port = acceptor.port(), "acceptor stopped");
}

/// Queue the policy and the current board list, then start the peer.
///
/// The board snapshot and the registration happen under the admission lock,
/// so a board event is either in the snapshot or broadcast to this peer.
fn admit(
    id: PeerId,
    stream: PeerStream,
    ctx: &ConnectionContext,
    boards: &dyn BoardRegistry,
) -> Result<()> {
    let _admission = ctx.admission.lock().unwrap_or_else(PoisonError::into_inner);
    let initial = vec![
        frame_document(CROSS_DOMAIN_POLICY),
        frame_document(&board_arrival_xml(&boards.connected_boards())),
    ];
    PeerConnection::start(id, stream, initial, ctx)?;
    Ok(())
}

fn dispatch_loop(
    rx: Receiver<BridgeEvent>,
    registry: Arc<PeerRegistry>,
    admission: Arc<Mutex<()>>,
    transport: Arc<dyn BoardTransport>,
) {
    for event in rx {
        let doc = match event {
            BridgeEvent::BoardArrived(boards) if !boards.is_empty() => board_arrival_xml(&boards),
            BridgeEvent::BoardRemoved(boards) if !boards.is_empty() => board_removal_xml(&boards),
            BridgeEvent::BoardArrived(_) | BridgeEvent::BoardRemoved(_) => continue,
            BridgeEvent::BoardInfoChanged(board) => board_info_xml(&board),
            BridgeEvent::OscPacketReceived { source, messages } => {
                if messages.is_empty() {
                    continue;
                }
                messages_to_xml(&messages, &source)
            }
            BridgeEvent::ClientPacketReceived { peer, packet } => {
                forward(peer, packet, transport.as_ref());
                continue;
            }
            BridgeEvent::Shutdown => break,
        };

        let frame = frame_document(&doc);
        let sent = {
            let _admission = admission.lock().unwrap_or_else(PoisonError::into_inner);
            registry.broadcast(&frame)
        };
        debug!(peers = sent, bytes = doc.len() + 1, "broadcast document");
    }
    debug!("dispatcher stopped");
}

fn forward(peer: PeerId, packet: InboundPacket, transport: &dyn BoardTransport) {
    if packet.messages.is_empty() {
        debug!(peer, destination = %packet.destination, "empty packet from peer");
        return;
    }
    let bytes = match encode(&packet.messages) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(peer, destination = %packet.destination, error = %err, "cannot encode packet from peer");
            return;
        }
    };
    if let Err(err) = transport.deliver(&packet.destination, bytes) {
        warn!(peer, destination = %packet.destination, error = %err, "board delivery failed");
    }
}
