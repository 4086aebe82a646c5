//! TLS streams and listeners.

use super::{TlsConfig, TlsRuntime};
use crate::mux::{Registrar, Waitable};
use crate::net::tcp::read_once;
use crate::net::{Listener, NetStream, SocketError, SocketResult, TcpServer, TcpSocket, TlsError};
use rustls::pki_types::ServerName;
use rustls::{ClientConnection, Connection, ServerConfig, ServerConnection};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Upper bound on a silent peer during the handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// TLS record header: content type, version, length.
const RECORD_HEADER_LEN: usize = 5;

/// Reassembles TLS records from the socket.
///
/// The session is only ever handed whole records, so the socket always sits
/// at a record boundary once the bytes held here are accounted for. That is
/// what lets [`TlsStream::downgrade`] stop reading right after the peer's
/// `close_notify`.
#[derive(Debug, Default)]
struct RecordReader {
    buf: Vec<u8>,
}

impl RecordReader {
    /// Bytes still needed to finish the record being assembled.
    fn missing(&self) -> usize {
        if self.buf.len() < RECORD_HEADER_LEN {
            return RECORD_HEADER_LEN - self.buf.len();
        }
        let length = usize::from(u16::from_be_bytes([self.buf[3], self.buf[4]]));
        RECORD_HEADER_LEN + length - self.buf.len()
    }

    /// Reads once, never past the end of the current record. Returns whether
    /// the record is now complete.
    fn fill<R: Read>(&mut self, mut source: R) -> io::Result<bool> {
        let start = self.buf.len();
        self.buf.resize(start + self.missing(), 0);
        let read = source.read(&mut self.buf[start..]);
        let n = match read {
            Ok(n) => n,
            Err(e) => {
                self.buf.truncate(start);
                return Err(e);
            }
        };
        self.buf.truncate(start + n);
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(self.missing() == 0)
    }

    /// Blocks until a whole record has been assembled.
    fn read_record(&mut self, sock: &TcpStream) -> io::Result<()> {
        loop {
            match self.fill(sock) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    #[cfg(test)]
    fn record(&self) -> &[u8] {
        &self.buf
    }

    /// Hands the completed record to the session.
    fn feed(&mut self, conn: &mut Connection) -> io::Result<()> {
        let mut rest = self.buf.as_slice();
        while !rest.is_empty() {
            conn.read_tls(&mut rest)?;
        }
        self.buf.clear();
        Ok(())
    }
}

/// A TLS session over a TCP connection.
pub struct TlsStream {
    conn: Connection,
    sock: TcpStream,
    records: RecordReader,
    peer: Option<SocketAddr>,
    verified: Arc<AtomicBool>,
    /// Decrypted bytes waiting in the session.
    pending: usize,
    peer_closed: bool,
}

impl TlsStream {
    /// Connects to `host:port` and performs a client handshake.
    pub fn connect(
        runtime: &TlsRuntime,
        host: &str,
        port: u16,
        config: &TlsConfig,
    ) -> SocketResult<Self> {
        let socket = TcpSocket::connect(host, port)?;
        Self::from_tcp(runtime, socket, host, config)
    }

    /// Upgrades an established plaintext connection, acting as the client.
    pub fn from_tcp(
        runtime: &TlsRuntime,
        socket: TcpSocket,
        server_name: &str,
        config: &TlsConfig,
    ) -> SocketResult<Self> {
        let (client_config, verdict) = config.client_config(runtime)?;
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsError::InvalidServerName(server_name.to_string()))?;
        let conn = ClientConnection::new(client_config, name).map_err(TlsError::from)?;
        Self::handshake(Connection::Client(conn), socket, verdict)
    }

    /// Upgrades an established plaintext connection, acting as the server.
    ///
    /// No client certificate is requested.
    pub fn accept_tcp(
        runtime: &TlsRuntime,
        socket: TcpSocket,
        config: &TlsConfig,
    ) -> SocketResult<Self> {
        let server_config = config.server_config(runtime, false)?;
        Self::accept_with(server_config, socket, true)
    }

    fn accept_with(config: Arc<ServerConfig>, socket: TcpSocket, verified: bool) -> SocketResult<Self> {
        let conn = ServerConnection::new(config).map_err(TlsError::from)?;
        Self::handshake(
            Connection::Server(conn),
            socket,
            Arc::new(AtomicBool::new(verified)),
        )
    }

    fn handshake(
        mut conn: Connection,
        socket: TcpSocket,
        verified: Arc<AtomicBool>,
    ) -> SocketResult<Self> {
        let peer = socket.peer_addr();
        let mut sock = socket.into_std();
        let mut records = RecordReader::default();

        sock.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        if let Err(e) = drive_handshake(&mut conn, &mut sock, &mut records) {
            warn!(peer = ?peer, error = %e, "TLS handshake failed");
            return Err(TlsError::Handshake(e).into());
        }
        sock.set_read_timeout(None)?;

        debug!(
            peer = ?peer,
            version = ?conn.protocol_version(),
            suite = ?conn.negotiated_cipher_suite().map(|s| s.suite()),
            verified = verified.load(Ordering::Acquire),
            "TLS session established"
        );

        let mut stream = Self {
            conn,
            sock,
            records,
            peer,
            verified,
            pending: 0,
            peer_closed: false,
        };
        stream.process().map_err(|_| TlsError::Handshake(io::ErrorKind::InvalidData.into()))?;
        Ok(stream)
    }

    /// Whether the peer's certificate checked out.
    ///
    /// A server stream that never asked for a client certificate reports
    /// `true`.
    pub fn peer_verified(&self) -> bool {
        self.verified.load(Ordering::Acquire)
    }

    /// Common name from the subject of the peer's certificate.
    pub fn peer_common_name(&self) -> Option<String> {
        let cert = self.conn.peer_certificates()?.first()?;
        let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref()).ok()?;
        let name = parsed.subject().iter_common_name().next()?.as_str().ok()?;
        Some(name.to_string())
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Ends the TLS session and hands back the bare TCP connection.
    ///
    /// Sends `close_notify`, then reads the peer's records one at a time
    /// until its own `close_notify` arrives, so nothing the peer sends in
    /// plaintext afterwards is consumed. A record already half read by
    /// [`receive`](NetStream::receive) is finished first.
    pub fn downgrade(mut self) -> SocketResult<TcpSocket> {
        self.conn.send_close_notify();
        self.flush_tls()
            .map_err(|e| TlsError::Shutdown(e.to_string()))?;

        while !self.peer_closed {
            self.records
                .read_record(&self.sock)
                .map_err(|e| TlsError::Shutdown(format!("waiting for close_notify: {e}")))?;
            self.records
                .feed(&mut self.conn)
                .map_err(|e| TlsError::Shutdown(e.to_string()))?;
            let state = self
                .conn
                .process_new_packets()
                .map_err(|e| TlsError::Shutdown(e.to_string()))?;
            self.pending = state.plaintext_bytes_to_read();
            self.peer_closed = state.peer_has_closed();
        }

        if self.pending > 0 {
            warn!(peer = ?self.peer, bytes = self.pending, "Discarding unread TLS data on downgrade");
        }
        debug!(peer = ?self.peer, "TLS session closed, continuing in plaintext");
        Ok(TcpSocket::from_std(self.sock))
    }

    fn flush_tls(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            self.conn.write_tls(&mut self.sock)?;
        }
        Ok(())
    }

    /// Decrypts whatever records have been read and answers protocol
    /// messages (alerts, key updates) that need a reply.
    fn process(&mut self) -> SocketResult<()> {
        match self.conn.process_new_packets() {
            Ok(state) => {
                self.pending = state.plaintext_bytes_to_read();
                self.peer_closed |= state.peer_has_closed();
            }
            Err(e) => {
                let _ = self.conn.write_tls(&mut self.sock);
                debug!(peer = ?self.peer, error = %e, "TLS session failed");
                return Err(SocketError::ConnectionClosed);
            }
        }
        self.flush_tls().map_err(|e| {
            debug!(peer = ?self.peer, error = %e, "TLS write failed");
            SocketError::ConnectionClosed
        })
    }
}

/// Runs the handshake one record at a time.
fn drive_handshake(
    conn: &mut Connection,
    sock: &mut TcpStream,
    records: &mut RecordReader,
) -> io::Result<()> {
    loop {
        while conn.wants_write() {
            conn.write_tls(&mut *sock)?;
        }
        if !conn.is_handshaking() {
            return Ok(());
        }
        records.read_record(sock)?;
        records.feed(conn)?;
        if let Err(e) = conn.process_new_packets() {
            // Deliver the alert before giving up.
            let _ = conn.write_tls(&mut *sock);
            return Err(io::Error::new(io::ErrorKind::InvalidData, e));
        }
    }
}

impl NetStream for TlsStream {
    fn send(&mut self, data: &[u8]) -> SocketResult<()> {
        let mut rest = data;
        while !rest.is_empty() {
            let written = self.conn.writer().write(rest).map_err(|e| {
                debug!(peer = ?self.peer, error = %e, "TLS send failed");
                SocketError::ConnectionClosed
            })?;
            self.flush_tls().map_err(|e| {
                debug!(peer = ?self.peer, error = %e, "TLS send failed");
                SocketError::ConnectionClosed
            })?;
            rest = &rest[written..];
        }
        trace!(peer = ?self.peer, bytes = data.len(), "Sent");
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], wait: bool) -> SocketResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.conn.reader().read(buf) {
                Ok(0) => {
                    debug!(peer = ?self.peer, "Peer closed the TLS session");
                    self.pending = 0;
                    return Err(SocketError::ConnectionClosed);
                }
                Ok(n) => {
                    self.pending = self.pending.saturating_sub(n);
                    trace!(peer = ?self.peer, bytes = n, "Received");
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    debug!(peer = ?self.peer, error = %e, "TLS receive failed");
                    return Err(SocketError::ConnectionClosed);
                }
            }

            let records = &mut self.records;
            match read_once(&self.sock, wait, |sock| records.fill(sock)) {
                Ok(None) => return Ok(0),
                Ok(Some(false)) => continue,
                Ok(Some(true)) => {}
                Err(e) => {
                    debug!(peer = ?self.peer, error = %e, "TLS receive failed");
                    return Err(SocketError::ConnectionClosed);
                }
            }
            if let Err(e) = self.records.feed(&mut self.conn) {
                debug!(peer = ?self.peer, error = %e, "TLS receive failed");
                return Err(SocketError::ConnectionClosed);
            }
            self.process()?;
        }
    }
}

impl Waitable for TlsStream {
    fn register_sources(&self, registrar: &mut Registrar) {
        registrar.register(&self.sock);
        if self.pending > 0 {
            registrar.mark_ready();
        }
    }
}

impl std::fmt::Debug for TlsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsStream")
            .field("peer", &self.peer)
            .field("verified", &self.peer_verified())
            .field("pending", &self.pending)
            .finish()
    }
}

/// A TLS listener.
///
/// Server configurations are built when the listener is created; the one
/// demanding client certificates only exists when a CA bundle is configured.
pub struct TlsServer {
    tcp: TcpServer,
    plain: Arc<ServerConfig>,
    requiring_cert: Option<Arc<ServerConfig>>,
}

impl TlsServer {
    pub fn listen(runtime: &TlsRuntime, port: u16, config: &TlsConfig) -> SocketResult<Self> {
        let plain = config.server_config(runtime, false)?;
        let requiring_cert = match config.ca_bundle() {
            Some(_) => Some(config.server_config(runtime, true)?),
            None => None,
        };
        Ok(Self {
            tcp: TcpServer::listen(port)?,
            plain,
            requiring_cert,
        })
    }

    /// Accepts a connection without asking for a client certificate.
    pub fn accept(&mut self, timeout: Option<Duration>) -> SocketResult<Option<TlsStream>> {
        let Some(socket) = self.tcp.accept(timeout)? else {
            return Ok(None);
        };
        TlsStream::accept_with(Arc::clone(&self.plain), socket, true).map(Some)
    }

    /// Accepts a connection whose client certificate must verify against
    /// the CA bundle. A missing or invalid certificate fails the accept.
    pub fn accept_requiring_cert(
        &mut self,
        timeout: Option<Duration>,
    ) -> SocketResult<Option<TlsStream>> {
        let config = self.requiring_cert.clone().ok_or(TlsError::NoCaBundle)?;
        let Some(socket) = self.tcp.accept(timeout)? else {
            return Ok(None);
        };
        TlsStream::accept_with(config, socket, true).map(Some)
    }

    pub fn local_port(&self) -> u16 {
        self.tcp.local_port()
    }
}

impl Waitable for TlsServer {
    fn register_sources(&self, registrar: &mut Registrar) {
        self.tcp.register_sources(registrar);
    }
}

impl Listener for TlsServer {
    fn accept_stream(
        &mut self,
        timeout: Option<Duration>,
    ) -> SocketResult<Option<Box<dyn NetStream>>> {
        Ok(self
            .accept(timeout)?
            .map(|stream| Box::new(stream) as Box<dyn NetStream>))
    }

    fn local_port(&self) -> u16 {
        self.tcp.local_port()
    }
}

impl std::fmt::Debug for TlsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsServer")
            .field("port", &self.tcp.local_port())
            .field("client_certs", &self.requiring_cert.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{client_config, path, server_config};
    use super::*;
    use crate::connection::{LineConfig, LineConnection};
    use bytes::Bytes;
    use crate::mux::SocketSet;
    use crate::net::KeyPassword;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::net::TcpListener;
    use std::rc::Rc;
    use std::thread;
    use std::time::Instant;

    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

    fn receive_exact(stream: &mut impl NetStream, len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while out.len() < len {
            let n = stream.receive(&mut buf, true).unwrap();
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    fn spawn_server<F, T>(handler: F) -> (u16, thread::JoinHandle<T>)
    where
        F: FnOnce(TlsServer) -> T + Send + 'static,
        T: Send + 'static,
    {
        let runtime = TlsRuntime::init().unwrap();
        let server = TlsServer::listen(&runtime, 0, &server_config()).unwrap();
        let port = server.local_port();
        (port, thread::spawn(move || handler(server)))
    }

    #[test]
    fn test_verified_session() {
        let (port, server) = spawn_server(|mut server| {
            let mut stream = server.accept(TIMEOUT).unwrap().unwrap();
            assert!(stream.peer_verified());
            assert_eq!(stream.peer_common_name(), None);
            let got = receive_exact(&mut stream, 9);
            stream.send(b"PONG :x\r\n").unwrap();
            got
        });

        let runtime = TlsRuntime::init().unwrap();
        let mut client = TlsStream::connect(&runtime, "127.0.0.1", port, &client_config()).unwrap();
        assert!(client.peer_verified());
        assert_eq!(client.peer_common_name().as_deref(), Some("localhost"));

        client.send(b"PING :x\r\n").unwrap();
        assert_eq!(receive_exact(&mut client, 9), b"PONG :x\r\n");
        assert_eq!(server.join().unwrap(), b"PING :x\r\n");
    }

    #[test]
    fn test_unverified_session_is_recorded() {
        let (port, server) = spawn_server(|mut server| {
            let mut stream = server.accept(TIMEOUT).unwrap().unwrap();
            receive_exact(&mut stream, 4)
        });

        let runtime = TlsRuntime::init().unwrap();
        let mut client = TlsStream::connect(&runtime, "127.0.0.1", port, &TlsConfig::new()).unwrap();
        assert!(!client.peer_verified());
        assert_eq!(client.peer_common_name().as_deref(), Some("localhost"));
        client.send(b"QUIT").unwrap();
        assert_eq!(server.join().unwrap(), b"QUIT");
    }

    #[test]
    fn test_required_verification_rejects() {
        let (port, server) = spawn_server(|mut server| server.accept(TIMEOUT).map(|s| s.is_some()));

        let runtime = TlsRuntime::init().unwrap();
        let config = TlsConfig::new().require_verified_peer(true);
        let err = TlsStream::connect(&runtime, "127.0.0.1", port, &config).unwrap_err();
        assert!(matches!(err, SocketError::Tls(TlsError::Handshake(_))));
        assert!(server.join().unwrap().is_err());
    }

    #[test]
    fn test_client_certificate_required() {
        let (port, server) = spawn_server(|mut server| {
            let stream = server.accept_requiring_cert(TIMEOUT).unwrap().unwrap();
            (stream.peer_verified(), stream.peer_common_name())
        });

        let runtime = TlsRuntime::init().unwrap();
        let config = client_config()
            .with_certificate(path("client.pem"))
            .with_private_key(path("client-encrypted.key"))
            .with_password(KeyPassword::Literal("hunter2".into()));
        let _client = TlsStream::connect(&runtime, "127.0.0.1", port, &config).unwrap();

        let (verified, name) = server.join().unwrap();
        assert!(verified);
        assert_eq!(name.as_deref(), Some("remram"));
    }

    #[test]
    fn test_missing_client_certificate_fails_accept() {
        let (port, server) = spawn_server(|mut server| {
            let result = server.accept_requiring_cert(TIMEOUT).map(|s| s.is_some());
            let listener_still_usable = server.accept(Some(Duration::ZERO)).is_ok();
            (result, listener_still_usable)
        });

        let runtime = TlsRuntime::init().unwrap();
        if let Ok(mut client) = TlsStream::connect(&runtime, "127.0.0.1", port, &client_config()) {
            // TLS 1.3 clients finish before the server judges them.
            let mut buf = [0u8; 8];
            assert!(client.receive(&mut buf, true).is_err());
        }

        let (result, usable) = server.join().unwrap();
        assert!(matches!(result, Err(SocketError::Tls(TlsError::Handshake(_)))));
        assert!(usable);
    }

    #[test]
    fn test_requiring_cert_without_ca_bundle() {
        let runtime = TlsRuntime::init().unwrap();
        let config = TlsConfig::new()
            .with_cert_chain(path("server-chain.pem"))
            .with_private_key(path("server.key"));
        let mut server = TlsServer::listen(&runtime, 0, &config).unwrap();
        let err = server.accept_requiring_cert(Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, SocketError::Tls(TlsError::NoCaBundle)));
    }

    #[test]
    fn test_downgrade_to_plaintext() {
        let (port, server) = spawn_server(|mut server| {
            let mut stream = server.accept(TIMEOUT).unwrap().unwrap();
            assert_eq!(receive_exact(&mut stream, 9), b"STARTPLN\n");
            let mut plain = stream.downgrade().unwrap();
            plain.send(b"plain hello\n").unwrap();
            receive_exact(&mut plain, 6)
        });

        let runtime = TlsRuntime::init().unwrap();
        let mut client = TlsStream::connect(&runtime, "127.0.0.1", port, &client_config()).unwrap();
        client.send(b"STARTPLN\n").unwrap();
        let mut plain = client.downgrade().unwrap();
        assert_eq!(receive_exact(&mut plain, 12), b"plain hello\n");
        plain.send(b"bye!\r\n").unwrap();
        assert_eq!(server.join().unwrap(), b"bye!\r\n");
    }

    #[test]
    fn test_buffered_plaintext_marks_ready() {
        let (port, server) = spawn_server(|mut server| {
            let mut stream = server.accept(TIMEOUT).unwrap().unwrap();
            stream.send(b"first line\r\nsecond line\r\n").unwrap();
            receive_exact(&mut stream, 2)
        });

        let runtime = TlsRuntime::init().unwrap();
        let mut client = TlsStream::connect(&runtime, "127.0.0.1", port, &client_config()).unwrap();
        let mut small = [0u8; 4];
        let n = client.receive(&mut small, true).unwrap();
        assert!(n > 0);

        let mut registrar = Registrar::new();
        client.register_sources(&mut registrar);
        assert!(registrar.is_ready());
        assert_eq!(registrar.fds().len(), 1);

        client.send(b"ok").unwrap();
        server.join().unwrap();
    }

    #[test]
    fn test_peer_close_is_connection_closed() {
        let (port, server) = spawn_server(|mut server| {
            let stream = server.accept(TIMEOUT).unwrap().unwrap();
            drop(stream);
        });

        let runtime = TlsRuntime::init().unwrap();
        let mut client = TlsStream::connect(&runtime, "127.0.0.1", port, &client_config()).unwrap();
        server.join().unwrap();
        let mut buf = [0u8; 8];
        let err = client.receive(&mut buf, true).unwrap_err();
        assert!(matches!(err, SocketError::ConnectionClosed));
    }

    /// Hands out scripted chunks; `None` stands for a read that would block.
    struct Trickle(VecDeque<Option<Vec<u8>>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(Some(mut chunk)) = self.0.pop_front() else {
                return Err(io::ErrorKind::WouldBlock.into());
            };
            if chunk.len() > buf.len() {
                let rest = chunk.split_off(buf.len());
                self.0.push_front(Some(rest));
            }
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_record_reader_stops_at_record_boundary() {
        let data = [23, 3, 3, 0, 4, b'a', b'b', b'c', b'd'];
        let alert = [21, 3, 3, 0, 2, 1, 0];
        let mut first = data.to_vec();
        first.extend_from_slice(&alert[..3]);
        let mut source = Trickle(VecDeque::from([Some(first), None, Some(alert[3..].to_vec())]));
        let mut reader = RecordReader::default();

        while !reader.fill(&mut source).unwrap() {}
        assert_eq!(reader.record(), &data);
        reader.buf.clear();

        assert!(!reader.fill(&mut source).unwrap());
        let err = reader.fill(&mut source).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(reader.record(), &alert[..3]);

        while !reader.fill(&mut source).unwrap() {}
        assert_eq!(reader.record(), &alert);
    }

    #[test]
    fn test_record_reader_reports_eof() {
        let mut reader = RecordReader::default();
        let err = reader.fill(&b""[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_downgrade_with_close_notify_split() {
        let runtime = TlsRuntime::init().unwrap();
        let config = server_config().server_config(&runtime, false).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            sock.set_nodelay(true).unwrap();
            let mut conn = ServerConnection::new(config).unwrap();
            while conn.is_handshaking() {
                conn.complete_io(&mut sock).unwrap();
            }
            while conn.wants_write() {
                conn.write_tls(&mut sock).unwrap();
            }

            conn.writer().write_all(b"hello\n").unwrap();
            conn.send_close_notify();
            let mut wire = Vec::new();
            while conn.wants_write() {
                conn.write_tls(&mut wire).unwrap();
            }

            // Data record plus three bytes of the alert, then the rest.
            let length = usize::from(u16::from_be_bytes([wire[3], wire[4]]));
            let split = RECORD_HEADER_LEN + length + 3;
            sock.write_all(&wire[..split]).unwrap();
            thread::sleep(Duration::from_millis(100));
            sock.write_all(&wire[split..]).unwrap();
            sock.write_all(b"plain\n").unwrap();

            let mut rest = Vec::new();
            sock.read_to_end(&mut rest).unwrap();
        });

        let mut client = TlsStream::connect(&runtime, "127.0.0.1", port, &client_config()).unwrap();
        assert_eq!(receive_exact(&mut client, 6), b"hello\n");
        let mut plain = client.downgrade().unwrap();
        assert_eq!(receive_exact(&mut plain, 6), b"plain\n");
        drop(plain);
        server.join().unwrap();
    }

    #[test]
    fn test_nonblocking_receive_without_data() {
        let (port, server) = spawn_server(|mut server| {
            let mut stream = server.accept(TIMEOUT).unwrap().unwrap();
            let got = receive_exact(&mut stream, 3);
            stream.send(b"hi\n").unwrap();
            got
        });

        let runtime = TlsRuntime::init().unwrap();
        let mut client = TlsStream::connect(&runtime, "127.0.0.1", port, &client_config()).unwrap();
        let mut buf = [0u8; 16];
        let start = Instant::now();
        assert_eq!(client.receive(&mut buf, false).unwrap(), 0);
        assert!(start.elapsed() < Duration::from_secs(1));

        client.send(b"go\n").unwrap();
        assert_eq!(receive_exact(&mut client, 3), b"hi\n");
        assert_eq!(server.join().unwrap(), b"go\n");
    }

    #[test]
    fn test_line_connection_drains_through_socket_set() {
        let (port, server) = spawn_server(|mut server| {
            let mut stream = server.accept(TIMEOUT).unwrap().unwrap();
            stream.send(b"first line\r\nsecond line\r\n").unwrap();
            receive_exact(&mut stream, 2)
        });

        let runtime = TlsRuntime::init().unwrap();
        let client = TlsStream::connect(&runtime, "127.0.0.1", port, &client_config()).unwrap();
        let config = LineConfig {
            chunk_size: 4,
            ..LineConfig::default()
        };
        let conn = Rc::new(RefCell::new(LineConnection::with_config(client, config)));
        let mut set: SocketSet<RefCell<LineConnection<TlsStream>>> = SocketSet::new().unwrap();
        set.add(&conn);

        let mut lines = Vec::new();
        while conn.borrow().stats().bytes_received == 0 {
            let ready = set.wait(TIMEOUT).unwrap().unwrap();
            lines.extend(ready.borrow_mut().read_lines(false).unwrap());
        }

        // The whole record is decrypted now and the socket has nothing left:
        // only the buffered plaintext can make the set report ready.
        while lines.len() < 2 {
            let ready = set.wait(Some(Duration::ZERO)).unwrap().unwrap();
            lines.extend(ready.borrow_mut().read_lines(false).unwrap());
        }
        assert_eq!(
            lines,
            vec![Bytes::from_static(b"first line"), Bytes::from_static(b"second line")]
        );

        conn.borrow_mut().get_mut().send(b"ok").unwrap();
        assert_eq!(server.join().unwrap(), b"ok");
    }
}
