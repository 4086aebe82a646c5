//! The socket set.

use super::{Registrar, Waitable};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::trace;

/// Initial event buffer size; grown when more descriptors are registered.
const INITIAL_EVENTS: usize = 16;

/// A set of waitables sharing one readiness wait.
///
/// Members are held by [`Weak`] reference: the set never keeps a connection
/// alive, and a member dropped while registered is pruned on the next
/// [`wait`](Self::wait). Membership is by identity, so adding the same `Rc`
/// twice is a no-op.
///
/// The type parameter lets a homogeneous set hand back its concrete member
/// type; the default works with any mix of waitables.
pub struct SocketSet<W: ?Sized = dyn Waitable> {
    members: Vec<Weak<W>>,
    poll: Poll,
    events: Events,
    registrar: Registrar,
}

impl<W: Waitable + ?Sized> SocketSet<W> {
    /// Creates an empty set.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            members: Vec::new(),
            poll: Poll::new()?,
            events: Events::with_capacity(INITIAL_EVENTS),
            registrar: Registrar::new(),
        })
    }

    /// Adds `member`. Returns `false` if it was already present.
    pub fn add(&mut self, member: &Rc<W>) -> bool {
        if self.contains(member) {
            return false;
        }
        self.members.push(Rc::downgrade(member));
        true
    }

    /// Removes `member`. Returns `true` iff it was present.
    pub fn remove(&mut self, member: &Rc<W>) -> bool {
        let target = Rc::downgrade(member);
        let before = self.members.len();
        self.members.retain(|m| !Weak::ptr_eq(m, &target));
        self.members.len() != before
    }

    /// Whether `member` is registered.
    pub fn contains(&self, member: &Rc<W>) -> bool {
        let target = Rc::downgrade(member);
        self.members.iter().any(|m| Weak::ptr_eq(m, &target))
    }

    /// Drops every registration.
    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Number of members still alive.
    pub fn len(&self) -> usize {
        self.members.iter().filter(|m| m.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until a member is ready or `timeout` elapses.
    ///
    /// `None` waits forever and `Some(Duration::ZERO)` only polls. When
    /// several members are ready at once, the one added first is returned.
    /// A set with nothing to wait on returns `Ok(None)` immediately, whatever
    /// the timeout. An interrupted wait is reported as a timeout.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Option<Rc<W>>> {
        self.members.retain(|m| m.strong_count() > 0);
        let live: Vec<Rc<W>> = self.members.iter().filter_map(Weak::upgrade).collect();
        if live.is_empty() {
            return Ok(None);
        }

        let mut registered: Vec<RawFd> = Vec::new();
        let mut first_ready = None;
        let outcome = self.register_all(&live, &mut registered, &mut first_ready);
        let outcome = outcome.and_then(|()| {
            if registered.is_empty() && first_ready.is_none() {
                return Ok(None);
            }
            let timeout = if first_ready.is_some() {
                Some(Duration::ZERO)
            } else {
                timeout
            };
            trace!(members = live.len(), fds = registered.len(), ?timeout, "waiting");
            self.poll_ready(timeout, first_ready)
        });
        self.deregister_all(&registered);

        Ok(outcome?.map(|index| Rc::clone(&live[index])))
    }

    fn register_all(
        &mut self,
        live: &[Rc<W>],
        registered: &mut Vec<RawFd>,
        first_ready: &mut Option<usize>,
    ) -> io::Result<()> {
        for (index, member) in live.iter().enumerate() {
            self.registrar.reset();
            member.register_sources(&mut self.registrar);
            if self.registrar.is_ready() && first_ready.is_none() {
                *first_ready = Some(index);
            }
            for &fd in self.registrar.fds() {
                if registered.contains(&fd) {
                    continue;
                }
                let registry = self.poll.registry();
                match registry.register(&mut SourceFd(&fd), Token(index), Interest::READABLE) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        registry.reregister(&mut SourceFd(&fd), Token(index), Interest::READABLE)?
                    }
                    Err(e) => return Err(e),
                }
                registered.push(fd);
            }
        }
        if self.events.capacity() < registered.len() {
            self.events = Events::with_capacity(registered.len());
        }
        Ok(())
    }

    fn poll_ready(
        &mut self,
        timeout: Option<Duration>,
        first_ready: Option<usize>,
    ) -> io::Result<Option<usize>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(first_ready),
            Err(e) => return Err(e),
        }
        let polled = self.events.iter().map(|event| event.token().0).min();
        Ok(match (first_ready, polled) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        })
    }

    fn deregister_all(&mut self, registered: &[RawFd]) {
        for fd in registered {
            if let Err(e) = self.poll.registry().deregister(&mut SourceFd(fd)) {
                trace!(fd, error = %e, "deregister failed");
            }
        }
    }
}

impl<W: ?Sized> std::fmt::Debug for SocketSet<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSet")
            .field("members", &self.members.len())
            .finish()
    }
}
