//! The line-buffered connection.
//!
//! ## Buffer Management
//!
//! Every call to [`LineConnection::read_lines`] appends at most one chunk to
//! a `BytesMut` accumulator and cuts complete lines off its front. The scan
//! for `\n` resumes where the previous call stopped, so a long line arriving
//! in many small chunks is scanned once, not once per chunk.
//!
//! ```text
//!  buffer:  [ 1 2 3 \n \n 1 2 | 3 4 \n ]
//!                              ^
//!                              scanned (previous length)
//! ```

use crate::mux::{Registrar, Waitable};
use crate::net::{NetStream, SocketError, SocketResult};
use crate::protocol::Command;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

/// Bytes requested from the stream per read.
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Tuning for a [`LineConnection`].
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Upper bound on a single receive.
    pub chunk_size: usize,

    /// Longest line accepted, terminator excluded. Longer lines are
    /// dropped whole, whether they arrive in one chunk or many. `None`
    /// means unlimited.
    pub max_line_length: Option<usize>,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_line_length: None,
        }
    }
}

/// Counters for one connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineStats {
    pub bytes_received: u64,
    pub lines_received: u64,
    pub lines_sent: u64,
    pub lines_dropped: u64,
}

/// A stream that hands out complete lines.
///
/// The connection owns its stream; dropping it closes the stream and
/// discards any partial line still buffered.
pub struct LineConnection<S = Box<dyn NetStream>> {
    stream: S,
    buffer: BytesMut,
    scanned: usize,
    /// Set while skipping the rest of an oversized line.
    discarding: bool,
    config: LineConfig,
    stats: LineStats,
}

impl<S: NetStream> LineConnection<S> {
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, LineConfig::default())
    }

    pub fn with_config(stream: S, config: LineConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            stream,
            buffer: BytesMut::with_capacity(chunk_size),
            scanned: 0,
            discarding: false,
            config: LineConfig {
                chunk_size,
                ..config
            },
            stats: LineStats::default(),
        }
    }

    /// Receives one chunk and returns every line it completed.
    ///
    /// Lines come back without their `\n` terminator, and without the `\r`
    /// right before it if there is one. The result may be empty even when
    /// `wait` is set: the chunk may not have finished a line yet.
    ///
    /// Errors from the stream are passed through unchanged. Whatever partial
    /// line is buffered at that point is never returned.
    ///
    /// A line over [`LineConfig::max_line_length`] is dropped up to and
    /// including its terminator. The call that drops it fails with
    /// [`SocketError::LineTooLong`] unless it also completed good lines, which
    /// are returned instead. [`LineStats::lines_dropped`] counts every drop.
    pub fn read_lines(&mut self, wait: bool) -> SocketResult<Vec<Bytes>> {
        let limit = self.config.max_line_length;
        let too_long = |len: usize| limit.is_some_and(|limit| len > limit);

        let start = self.buffer.len();
        self.buffer.resize(start + self.config.chunk_size, 0);
        let received = match self.stream.receive(&mut self.buffer[start..], wait) {
            Ok(n) => n,
            Err(e) => {
                self.buffer.truncate(start);
                return Err(e);
            }
        };
        self.buffer.truncate(start + received);
        self.stats.bytes_received += received as u64;

        let mut lines = Vec::new();
        let mut dropped = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let mut line = self.buffer.split_to(end + 1);
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }
            if too_long(line.len()) {
                dropped += 1;
                continue;
            }
            lines.push(line.freeze());
        }

        // A trailing CR may still turn out to be part of the terminator.
        let partial = match self.buffer.last() {
            Some(b'\r') => self.buffer.len() - 1,
            _ => self.buffer.len(),
        };
        if !self.discarding && too_long(partial) {
            self.discarding = true;
            dropped += 1;
        }
        if self.discarding {
            self.buffer.clear();
        }
        self.scanned = self.buffer.len();

        self.stats.lines_received += lines.len() as u64;
        self.stats.lines_dropped += dropped;
        trace!(
            received,
            lines = lines.len(),
            buffered = self.buffer.len(),
            "Read chunk"
        );

        if let Some(limit) = limit.filter(|_| dropped > 0) {
            debug!(dropped, limit, "Dropped oversized line");
            if lines.is_empty() {
                return Err(SocketError::LineTooLong { limit });
            }
        }
        Ok(lines)
    }

    /// Sends `line` followed by CRLF.
    pub fn send_line(&mut self, line: &[u8]) -> SocketResult<()> {
        let mut out = BytesMut::with_capacity(line.len() + 2);
        out.put_slice(line);
        out.put_slice(b"\r\n");
        self.stream.send(&out)?;
        self.stats.lines_sent += 1;
        Ok(())
    }

    /// Renders `command` and sends it as one line.
    pub fn send_command(&mut self, command: &Command) -> SocketResult<()> {
        self.send_line(command.render().as_bytes())
    }
}

impl<S> LineConnection<S> {
    /// Bytes held back waiting for a terminator.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> LineStats {
        self.stats
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Gives the stream back. Buffered bytes are dropped.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Waitable> Waitable for LineConnection<S> {
    fn register_sources(&self, registrar: &mut Registrar) {
        self.stream.register_sources(registrar);
    }
}

impl<S> std::fmt::Debug for LineConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineConnection")
            .field("buffered", &self.buffer.len())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}
