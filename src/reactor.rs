//! Reactor hooks consumed by the poll adapter: per-direction read/write
//! interest on top of an epoll registration that only knows a single
//! combined interest mask per descriptor.
//!
//! Grounded on `mio`'s `sys::unix::selector::epoll` for the epoll wrapper
//! itself; the read/write split is new plumbing epoll has no direct
//! equivalent of (unlike kqueue's separate read/write filters), built the
//! way `mio::Registry` already tracks registration state (`register` vs
//! `reregister` based on whether a token was previously registered).

use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use slab::Slab;

use crate::epoll::{Epoll, EpollOpt, Events, Ready};
use crate::file_event::FileEvent;
use crate::poll_adapter::PollEventShared;

pub struct Reactor {
    epoll: Epoll,
}

impl Reactor {
    pub fn new() -> io::Result<Reactor> {
        Ok(Reactor {
            epoll: Epoll::new()?,
        })
    }

    pub fn wait(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<usize> {
        self.epoll.wait(events, timeout)
    }

    pub fn add_read(&self, fe: &FileEvent) -> io::Result<()> {
        self.adjust(fe, Ready::readable(), true)
    }

    pub fn add_write(&self, fe: &FileEvent) -> io::Result<()> {
        self.adjust(fe, Ready::writable(), true)
    }

    pub fn del_read(&self, fe: &FileEvent) -> io::Result<()> {
        self.adjust(fe, Ready::readable(), false)
    }

    pub fn del_write(&self, fe: &FileEvent) -> io::Result<()> {
        self.adjust(fe, Ready::writable(), false)
    }

    fn adjust(&self, fe: &FileEvent, bit: Ready, set: bool) -> io::Result<()> {
        let mut interest = fe.interest.lock().unwrap();
        let was_registered = !interest.is_empty();

        if set {
            interest.insert(bit);
        } else {
            interest.remove(bit);
        }

        if interest.is_empty() {
            if was_registered {
                self.epoll.delete(&fe.fd)?;
            }
            return Ok(());
        }

        // Level-triggered only: poll() callers never see edge-triggered
        // semantics.
        if was_registered {
            self.epoll.modify(&fe.fd, fe.token, *interest, EpollOpt::level())
        } else {
            self.epoll.add(&fe.fd, fe.token, *interest, EpollOpt::level())
        }
    }
}

/// The reactor's set of in-flight poll calls. Consulted to compute the
/// driver's next wait deadline and, as a liveness check, to reset it to "no
/// deadline" once it empties out.
///
/// The membership table itself is a `Slab` (the same structure `mio` uses
/// internally for its own token allocation, see `util::slab`) rather than
/// the intrusive linked list the original keeps, since ownership here is an
/// `Arc` handed out at insertion and handed back at removal rather than a
/// raw pointer threaded through a global ring.
#[derive(Default)]
pub struct ActivePollList {
    entries: Mutex<Slab<Arc<PollEventShared>>>,
    deadline: Mutex<Option<Instant>>,
}

impl ActivePollList {
    pub fn new() -> ActivePollList {
        ActivePollList::default()
    }

    /// Inserts `event`, returning the key needed to `detach` it later.
    pub fn prepend(&self, event: Arc<PollEventShared>) -> usize {
        self.entries.lock().unwrap().insert(event)
    }

    pub fn detach(&self, key: usize) {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains(key) {
            entries.remove(key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Lowers the driver's wait deadline to `candidate` if it is tighter
    /// than whatever is currently recorded (or nothing is recorded yet).
    pub fn lower_deadline(&self, candidate: Instant) {
        let mut deadline = self.deadline.lock().unwrap();
        *deadline = Some(match *deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        });
    }

    /// Resets the deadline to "no deadline" once the list has drained.
    pub fn clear_if_empty(&self) {
        if self.is_empty() {
            *self.deadline.lock().unwrap() = None;
        }
    }

    pub fn current_deadline(&self) -> Option<Instant> {
        *self.deadline.lock().unwrap()
    }

    pub fn for_each(&self, mut f: impl FnMut(Arc<PollEventShared>)) {
        let entries = self.entries.lock().unwrap();
        for (_, event) in entries.iter() {
            f(Arc::clone(event));
        }
    }
}
