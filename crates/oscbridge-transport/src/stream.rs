use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected peer socket. Implements Read + Write.
pub struct PeerStream {
    inner: TcpStream,
    peer_addr: SocketAddr,
}

impl Read for PeerStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for PeerStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl PeerStream {
    pub(crate) fn new(inner: TcpStream, peer_addr: SocketAddr) -> Self {
        Self { inner, peer_addr }
    }

    /// Remote address of the peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Local address of this end of the connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Set read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Disable Nagle; documents are small and latency matters.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Clone the handle (new file descriptor, same socket).
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self::new(self.inner.try_clone()?, self.peer_addr))
    }

    /// Signal end of stream to the remote side; reads keep working.
    pub fn shutdown_write(&self) -> Result<()> {
        self.inner.shutdown(Shutdown::Write).map_err(Into::into)
    }

    /// Shut down both directions. Blocked reads and writes on clones return.
    ///
    /// `NotConnected` is ignored: the peer may already have gone.
    pub fn shutdown(&self) -> Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            Err(err) if err.kind() != std::io::ErrorKind::NotConnected => Err(err.into()),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for PeerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerStream")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}
