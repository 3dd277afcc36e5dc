//! The runtime's file-event registry: the reactor's per-descriptor record
//! of current interest and the single poll binding waiting on it.
//!
//! Grounded on `mio::event::Source`/`Registry` (one long-lived registration
//! per descriptor, looked up by token rather than recreated per wait). The
//! back-link to a waiting
//! [`PollFd`](crate::poll_adapter::PollFd) is resolved by index into the
//! owning [`PollEventShared`](crate::poll_adapter::PollEventShared)'s fiber
//! array, not by a raw pointer, so a stale link is a checked lookup rather
//! than a dangling read.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};

use crate::epoll::{Ready, Token};
use crate::poll_adapter::PollEventShared;

/// Single-slot back-link from a [`FileEvent`] to the `PollFd` currently
/// awaiting it. `None` when no poll call is waiting on this descriptor.
#[derive(Clone)]
pub struct PollBinding {
    pub owner: Arc<PollEventShared>,
    pub index: usize,
}

/// The reactor's per-descriptor record: which directions are currently
/// registered with epoll, and who is waiting.
pub struct FileEvent {
    pub(crate) fd: RawFd,
    pub(crate) token: Token,
    pub(crate) interest: Mutex<Ready>,
    pub(crate) binding: Mutex<Option<PollBinding>>,
}

impl FileEvent {
    fn new(fd: RawFd) -> FileEvent {
        FileEvent {
            fd,
            token: Token(fd as usize),
            interest: Mutex::new(Ready::empty()),
            binding: Mutex::new(None),
        }
    }
}

/// Idempotent lookup-or-create table keyed by OS descriptor. Mutated only
/// by the owning loop's threads; entries accumulate for the registry's
/// lifetime (descriptors are cheap and typically reused across many poll
/// calls by the same fiber, matching `mio`'s long-lived registration
/// handles).
#[derive(Default)]
pub struct FileEventRegistry {
    table: Mutex<HashMap<RawFd, Arc<FileEvent>>>,
}

impl FileEventRegistry {
    pub fn new() -> FileEventRegistry {
        FileEventRegistry::default()
    }

    /// Looks up or creates the entry keyed by `fd`.
    pub fn open(&self, fd: RawFd) -> Arc<FileEvent> {
        let mut table = self.table.lock().unwrap();
        table
            .entry(fd)
            .or_insert_with(|| Arc::new(FileEvent::new(fd)))
            .clone()
    }
}
