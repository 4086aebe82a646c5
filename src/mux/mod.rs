//! Readiness Multiplexer
//!
//! One thread, many endpoints, a single OS-level wait. Anything that can
//! become ready implements [`Waitable`]; a [`SocketSet`] collects them and
//! blocks until one of them is.
//!
//! ## How Registration Works
//!
//! ```text
//!   SocketSet::wait()
//!        │
//!        │  for each member (insertion order)
//!        ▼
//!   ┌──────────────────────┐     register_sources()    ┌──────────────────┐
//!   │ Registrar (per call) │ ◄──────────────────────── │ LineConnection   │
//!   │                      │                           │   └─ TlsStream   │
//!   │  fds:   [7]          │     delegates to the      │       └─ socket 7│
//!   │  ready: true/false   │     stream it owns        └──────────────────┘
//!   └──────────┬───────────┘
//!              │
//!              ▼
//!   mio::Poll  (epoll / kqueue)  ──►  lowest ready index wins
//! ```
//!
//! A composite waitable never hands out the object it wraps; it only forwards
//! the registration call. A waitable can also report that it is ready without
//! any descriptor firing (a TLS stream holding decrypted bytes), in which case
//! the wait does not block.

mod set;

pub use set::SocketSet;

use std::cell::RefCell;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

/// Something the [`SocketSet`] can wait on.
pub trait Waitable {
    /// Adds this object's readiness sources to `registrar`.
    fn register_sources(&self, registrar: &mut Registrar);
}

/// Collects the readiness sources of one [`Waitable`] for one poll cycle.
#[derive(Debug, Default)]
pub struct Registrar {
    fds: Vec<RawFd>,
    ready: bool,
}

impl Registrar {
    /// Creates an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a raw descriptor for read readiness.
    pub fn register_fd(&mut self, fd: RawFd) {
        if !self.fds.contains(&fd) {
            self.fds.push(fd);
        }
    }

    /// Registers anything that exposes a descriptor.
    pub fn register<S: AsRawFd + ?Sized>(&mut self, source: &S) {
        self.register_fd(source.as_raw_fd());
    }

    /// Reports data that is already available without touching the socket.
    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    /// Descriptors registered so far.
    pub fn fds(&self) -> &[RawFd] {
        &self.fds
    }

    /// Whether [`mark_ready`](Self::mark_ready) was called.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn reset(&mut self) {
        self.fds.clear();
        self.ready = false;
    }
}

impl<T: Waitable + ?Sized> Waitable for Box<T> {
    fn register_sources(&self, registrar: &mut Registrar) {
        (**self).register_sources(registrar)
    }
}

impl<T: Waitable + ?Sized> Waitable for Rc<T> {
    fn register_sources(&self, registrar: &mut Registrar) {
        (**self).register_sources(registrar)
    }
}

impl<T: Waitable + ?Sized> Waitable for &T {
    fn register_sources(&self, registrar: &mut Registrar) {
        (**self).register_sources(registrar)
    }
}

/// A connection borrowed mutably elsewhere contributes nothing this cycle.
impl<T: Waitable + ?Sized> Waitable for RefCell<T> {
    fn register_sources(&self, registrar: &mut Registrar) {
        if let Ok(inner) = self.try_borrow() {
            inner.register_sources(registrar);
        }
    }
}

/// Converts the `-1` / `0` / `n` millisecond convention into a wait timeout.
///
/// Negative values block forever, zero polls, anything else waits that long.
pub fn timeout_from_millis(ms: i64) -> Option<Duration> {
    u64::try_from(ms).ok().map(Duration::from_millis)
}
