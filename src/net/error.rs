//! Transport errors.
//!
//! Every failure surfaced by a [`NetStream`](super::NetStream) or a
//! [`Listener`](super::Listener) is a [`SocketError`]. The core never retries
//! on its own: a `ConnectionClosed` travels up unchanged so that the owner of
//! the connection can decide whether to reconnect.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by streams and listeners.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The peer went away, or the transport failed irrecoverably.
    #[error("connection closed")]
    ConnectionClosed,

    /// Name resolution failed.
    #[error("unknown host: {0}")]
    UnknownHost(String),

    /// Every resolved address refused the connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The listening port could not be bound.
    #[error("can't use port {port}: {source}")]
    PortUnusable {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// A line grew past the configured limit without a terminator.
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// TLS configuration, handshake or shutdown failure.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Unexpected operating system failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors specific to the TLS layer.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A configured file could not be loaded or understood.
    #[error("TLS configuration error ({path}): {reason}")]
    Config { path: PathBuf, reason: String },

    /// The configuration is unusable as a whole (no certificate, no cipher
    /// suite left after filtering, ...).
    #[error("TLS configuration error: {0}")]
    Settings(String),

    /// Building the rustls configuration failed.
    #[error("TLS setup error: {0}")]
    Rustls(#[from] rustls::Error),

    /// The handshake did not complete.
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    /// Peer certificates were requested but no CA bundle is configured.
    #[error("no CA bundle configured to verify peer certificates")]
    NoCaBundle,

    /// The host name is not a valid TLS server name.
    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    /// The close_notify exchange did not complete.
    #[error("TLS shutdown failed: {0}")]
    Shutdown(String),
}

impl TlsError {
    pub(crate) fn config(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TlsError::Config {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias for transport results.
pub type SocketResult<T> = Result<T, SocketError>;
