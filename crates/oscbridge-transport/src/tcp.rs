use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::PeerStream;

/// Listening TCP socket for XML peers.
///
/// `accept` blocks. Another thread can call [`TcpAcceptor::unblock`] to make
/// a pending or future `accept` return [`TransportError::Shutdown`].
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
    closed: AtomicBool,
}

impl TcpAcceptor {
    /// Bind and listen on `addr`. Port 0 picks an ephemeral port.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, "listening for XML peers");

        Ok(Self {
            listener,
            local_addr,
            closed: AtomicBool::new(false),
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<PeerStream> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::Shutdown);
            }
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    if self.closed.load(Ordering::Acquire) {
                        debug!(%peer_addr, "dropping connection accepted during shutdown");
                        return Err(TransportError::Shutdown);
                    }
                    debug!(%peer_addr, "accepted connection");
                    return Ok(PeerStream::new(stream, peer_addr));
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting. A thread blocked in `accept` is woken by a loopback
    /// connection and sees the closed flag.
    pub fn unblock(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut wake = self.local_addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake {
                SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            });
        }
        if let Err(err) = TcpStream::connect(wake) {
            debug!(%wake, error = %err, "wake-up connection failed");
        }
        info!(local_addr = %self.local_addr, "stopped listening");
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

/// Connect to a listening bridge (blocking). `addr` is anything
/// [`ToSocketAddrs`] accepts, e.g. `"localhost:11000"`.
pub fn connect(addr: &str) -> Result<PeerStream> {
    let connect_err = |source| TransportError::Connect {
        addr: addr.to_string(),
        source,
    };
    let mut last_err = None;
    for candidate in addr.to_socket_addrs().map_err(connect_err)? {
        match TcpStream::connect(candidate) {
            Ok(stream) => {
                debug!(%candidate, "connected to bridge");
                return Ok(PeerStream::new(stream, candidate));
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(connect_err(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "address resolved to nothing")
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::sync::Arc;

    fn loopback() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
    }

    #[test]
    fn bind_accept_connect() {
        let acceptor = TcpAcceptor::bind(loopback()).expect("bind should succeed");
        assert_ne!(acceptor.port(), 0);

        let target = acceptor.local_addr().to_string();
        let handle = std::thread::spawn(move || {
            let mut client = connect(&target).expect("connect should succeed");
            client.write_all(b"hello\0").expect("write should succeed");
        });

        let mut server = acceptor.accept().expect("accept should succeed");
        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).expect("read should succeed");
        assert_eq!(&buf, b"hello\0");
        assert!(server.peer_addr().ip().is_loopback());

        handle.join().expect("client thread should not panic");
    }

    #[test]
    fn bind_conflict_reports_address() {
        let first = TcpAcceptor::bind(loopback()).expect("bind should succeed");
        let err = TcpAcceptor::bind(first.local_addr()).expect_err("second bind should fail");
        match err {
            TransportError::Bind { addr, .. } => assert_eq!(addr, first.local_addr()),
            other => panic!("expected Bind error, got {other:?}"),
        }
    }

    #[test]
    fn unblock_wakes_blocked_accept() {
        let acceptor = Arc::new(TcpAcceptor::bind(loopback()).expect("bind should succeed"));
        let waiter = {
            let acceptor = Arc::clone(&acceptor);
            std::thread::spawn(move || acceptor.accept())
        };

        std::thread::sleep(std::time::Duration::from_millis(50));
        acceptor.unblock();

        let result = waiter.join().expect("accept thread should not panic");
        assert!(matches!(result, Err(TransportError::Shutdown)));
        assert!(acceptor.is_closed());
    }

    #[test]
    fn shutdown_unblocks_clone_reader() {
        let acceptor = TcpAcceptor::bind(loopback()).expect("bind should succeed");
        let _client = connect(&acceptor.local_addr().to_string()).expect("connect should succeed");
        let server = acceptor.accept().expect("accept should succeed");

        let mut reader = server.try_clone().expect("clone should succeed");
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            reader.read(&mut buf)
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        server.shutdown().expect("shutdown should succeed");
        let read = handle.join().expect("reader should not panic");
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
