//! Network Stream Module
//!
//! Uniform byte transport over plaintext TCP or TLS. Everything above this
//! layer (line buffering, command parsing) is written once against
//! [`NetStream`] and never learns which transport it is talking to.
//!
//! ## Module Structure
//!
//! - `error` - [`SocketError`] / [`TlsError`]
//! - `tcp` - plaintext [`TcpSocket`] and [`TcpServer`]
//! - `tls` - [`TlsStream`], [`TlsServer`], [`TlsConfig`] and the
//!   process-wide [`TlsRuntime`] handle
//!
//! ## Receive Semantics
//!
//! ```text
//! receive(buf, wait = false)   data buffered?  ── no ──►  Ok(0)
//!                                    │
//!                                   yes
//!                                    ▼
//!                               Ok(1..=buf.len())
//!
//! receive(buf, wait = true)    blocks until at least one byte, then as above
//!
//! peer closed / transport failure  ──►  Err(SocketError::ConnectionClosed)
//! ```

mod error;
pub mod tcp;
pub mod tls;

pub use error::{SocketError, SocketResult, TlsError};
pub use tcp::{TcpServer, TcpSocket};
pub use tls::{KeyEncoding, KeyPassword, TlsConfig, TlsRuntime, TlsServer, TlsStream};

use crate::mux::Waitable;
use std::time::Duration;

/// A bidirectional byte stream.
pub trait NetStream: Waitable {
    /// Sends the whole of `data`, blocking as needed.
    fn send(&mut self, data: &[u8]) -> SocketResult<()>;

    /// Receives up to `buf.len()` bytes.
    ///
    /// Without `wait`, returns `Ok(0)` when nothing is available right now.
    /// With `wait`, blocks until at least one byte arrives. A closed peer is
    /// always an error, never `Ok(0)`.
    fn receive(&mut self, buf: &mut [u8], wait: bool) -> SocketResult<usize>;
}

impl<S: NetStream + ?Sized> NetStream for Box<S> {
    fn send(&mut self, data: &[u8]) -> SocketResult<()> {
        (**self).send(data)
    }

    fn receive(&mut self, buf: &mut [u8], wait: bool) -> SocketResult<usize> {
        (**self).receive(buf, wait)
    }
}

/// Something that produces streams.
pub trait Listener: Waitable {
    /// Waits up to `timeout` for a peer and returns its stream.
    ///
    /// `None` waits forever. Returns `Ok(None)` on timeout.
    fn accept_stream(&mut self, timeout: Option<Duration>)
        -> SocketResult<Option<Box<dyn NetStream>>>;

    /// The port actually bound.
    fn local_port(&self) -> u16;
}
