//! Plaintext TCP streams and listeners.

use super::{Listener, NetStream, SocketError, SocketResult};
use crate::mux::{Registrar, Waitable};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const LISTENER: Token = Token(0);

/// A connected plaintext TCP stream.
#[derive(Debug)]
pub struct TcpSocket {
    stream: TcpStream,
    peer: Option<SocketAddr>,
}

impl TcpSocket {
    /// Resolves `host` and connects to the first address that accepts.
    pub fn connect(host: &str, port: u16) -> SocketResult<Self> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|_| SocketError::UnknownHost(host.to_string()))?
            .collect();
        if addrs.is_empty() {
            return Err(SocketError::UnknownHost(host.to_string()));
        }

        for addr in addrs {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    debug!(peer = %addr, "Connected");
                    return Ok(Self::from_std(stream));
                }
                Err(e) => debug!(peer = %addr, error = %e, "Connect attempt failed"),
            }
        }
        Err(SocketError::ConnectionRefused(format!("{host}:{port}")))
    }

    /// Connects to an already resolved address.
    pub fn connect_addr(addr: SocketAddr) -> SocketResult<Self> {
        let stream = TcpStream::connect(addr).map_err(|e| {
            debug!(peer = %addr, error = %e, "Connect failed");
            SocketError::ConnectionRefused(addr.to_string())
        })?;
        Ok(Self::from_std(stream))
    }

    /// Wraps a connected std stream.
    pub fn from_std(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self { stream, peer }
    }

    /// Address of the remote end, if it was known at connect time.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    pub fn into_std(self) -> TcpStream {
        self.stream
    }

    /// Closes both directions.
    pub fn shutdown(&self) -> SocketResult<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads once from `stream`, optionally without blocking.
///
/// `Ok(None)` means nothing was available; `Ok(Some(0))` is end of stream.
pub(crate) fn read_once<R, F>(stream: &TcpStream, wait: bool, mut read: F) -> io::Result<Option<R>>
where
    F: FnMut(&TcpStream) -> io::Result<R>,
{
    if wait {
        loop {
            match read(stream) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other.map(Some),
            }
        }
    }

    stream.set_nonblocking(true)?;
    let result = read(stream);
    stream.set_nonblocking(false)?;
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e)
            if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::Interrupted =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl NetStream for TcpSocket {
    fn send(&mut self, data: &[u8]) -> SocketResult<()> {
        self.stream.write_all(data).map_err(|e| {
            debug!(peer = ?self.peer, error = %e, "Send failed");
            SocketError::ConnectionClosed
        })?;
        trace!(peer = ?self.peer, bytes = data.len(), "Sent");
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], wait: bool) -> SocketResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match read_once(&self.stream, wait, |mut stream| stream.read(buf)) {
            Ok(None) => Ok(0),
            Ok(Some(0)) => {
                debug!(peer = ?self.peer, "Peer closed the connection");
                Err(SocketError::ConnectionClosed)
            }
            Ok(Some(n)) => {
                trace!(peer = ?self.peer, bytes = n, "Received");
                Ok(n)
            }
            Err(e) => {
                debug!(peer = ?self.peer, error = %e, "Receive failed");
                Err(SocketError::ConnectionClosed)
            }
        }
    }
}

impl Waitable for TcpSocket {
    fn register_sources(&self, registrar: &mut Registrar) {
        registrar.register(&self.stream);
    }
}

/// A plaintext listener bound on every IPv4 interface.
///
/// The listening socket stays non-blocking and is watched by a private poll,
/// so [`accept`](Self::accept) can honour its timeout. It can also be added
/// to a [`SocketSet`](crate::mux::SocketSet) like any other waitable.
pub struct TcpServer {
    listener: TcpListener,
    poll: Poll,
    events: Events,
    port: u16,
}

impl TcpServer {
    /// Binds `port` (0 picks an ephemeral one) and starts listening.
    pub fn listen(port: u16) -> SocketResult<Self> {
        let unusable = |source| SocketError::PortUnusable { port, source };

        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).map_err(unusable)?;
        listener.set_nonblocking(true).map_err(unusable)?;
        let bound = listener.local_addr().map_err(unusable)?.port();

        let poll = Poll::new()?;
        poll.registry().register(
            &mut SourceFd(&listener.as_raw_fd()),
            LISTENER,
            Interest::READABLE,
        )?;

        debug!(port = bound, "Listening");
        Ok(Self {
            listener,
            poll,
            events: Events::with_capacity(4),
            port: bound,
        })
    }

    /// Waits up to `timeout` for a connection. `None` waits forever.
    pub fn accept(&mut self, timeout: Option<Duration>) -> SocketResult<Option<TcpSocket>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(false)?;
                    debug!(peer = %addr, port = self.port, "Accepted connection");
                    return Ok(Some(TcpSocket::from_std(stream)));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                return Ok(None);
            }
            match self.poll.poll(&mut self.events, remaining) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn local_port(&self) -> u16 {
        self.port
    }
}

impl Waitable for TcpServer {
    fn register_sources(&self, registrar: &mut Registrar) {
        registrar.register(&self.listener);
    }
}

impl Listener for TcpServer {
    fn accept_stream(
        &mut self,
        timeout: Option<Duration>,
    ) -> SocketResult<Option<Box<dyn NetStream>>> {
        Ok(self
            .accept(timeout)?
            .map(|socket| Box::new(socket) as Box<dyn NetStream>))
    }

    fn local_port(&self) -> u16 {
        self.port
    }
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer").field("port", &self.port).finish()
    }
}
