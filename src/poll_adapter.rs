//! The poll-multiplexing adapter: turns a multi-descriptor readiness wait
//! into a cooperative suspension point, driven by the reactor and the fiber
//! scheduler.
//!
//! Grounded on `lib_fiber/c/src/hook/poll.c`'s `poll_hook`, `POLLFD` and
//! `POLL_EVENT` structures, and its `read_callback`/`write_callback`/wait
//! loop. The cross-links that the original ties together with raw pointers
//! are reimplemented as an index into the owning [`PollEventShared`]'s
//! array plus a non-owning `Arc`, per the ownership design in DESIGN.md.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::atomic::AtomicI64Cell;
use crate::epoll::Ready;
use crate::file_event::{FileEvent, FileEventRegistry, PollBinding};
use crate::fiber::{FiberHandle, Scheduler};
use crate::hook;
use crate::reactor::{ActivePollList, Reactor};

/// One descriptor's request/response slot, as handed to [`poll`]. Mirrors a
/// libc `pollfd` but with a typed readiness set in place of raw bitmasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollFdRequest {
    pub fd: RawFd,
    pub events: Ready,
    pub revents: Ready,
}

impl PollFdRequest {
    pub fn new(fd: RawFd, events: Ready) -> PollFdRequest {
        PollFdRequest {
            fd,
            events,
            revents: Ready::empty(),
        }
    }
}

/// One descriptor's state inside a single in-flight poll call.
struct PollFd {
    requested: Ready,
    file_event: Arc<FileEvent>,
    revents: Mutex<Ready>,
}

/// The full state of one in-flight poll call by one fiber.
pub struct PollEventShared {
    fds: Vec<PollFd>,
    fiber: FiberHandle,
    ready: AtomicI64Cell,
}

impl PollEventShared {
    pub(crate) fn fiber(&self) -> &FiberHandle {
        &self.fiber
    }
}

/// Fires when a file event becomes readable. Returns the fiber to resume if
/// this wake contributed new readiness to its owning poll call.
pub(crate) fn read_callback(reactor: &Reactor, fe: &Arc<FileEvent>) -> Option<FiberHandle> {
    deliver(reactor, fe, Ready::readable())
}

/// Symmetric with [`read_callback`], for the write direction.
pub(crate) fn write_callback(reactor: &Reactor, fe: &Arc<FileEvent>) -> Option<FiberHandle> {
    deliver(reactor, fe, Ready::writable())
}

/// Error/hangup conditions are reported regardless of which direction was
/// requested, matching real `poll(2)`. Always tears down both interests:
/// once a descriptor errors there is nothing left to wait for.
pub(crate) fn error_callback(reactor: &Reactor, fe: &Arc<FileEvent>, bits: Ready) -> Option<FiberHandle> {
    let binding = fe.binding.lock().unwrap().clone()?;
    let pfd = &binding.owner.fds[binding.index];

    let _ = reactor.del_read(fe);
    let _ = reactor.del_write(fe);

    let was_empty = {
        let mut revents = pfd.revents.lock().unwrap();
        let was_empty = revents.is_empty();
        revents.insert(bits);
        was_empty
    };

    *fe.binding.lock().unwrap() = None;

    if was_empty {
        binding.owner.ready.fetch_add(1);
    }
    Some(binding.owner.fiber.clone())
}

/// Descriptor semantics (the policy chosen for the ready-counting ambiguity
/// in the original source): increments the owning call's ready count only
/// on a PollFd's transition from zero to non-zero `revents`, so a
/// dual-direction request that fires both callbacks still contributes
/// exactly once.
fn deliver(reactor: &Reactor, fe: &Arc<FileEvent>, bit: Ready) -> Option<FiberHandle> {
    let binding = fe.binding.lock().unwrap().clone()?;
    let pfd = &binding.owner.fds[binding.index];
    debug_assert!(
        (bit.is_readable() && pfd.requested.is_readable())
            || (bit.is_writable() && pfd.requested.is_writable())
    );

    if bit.is_readable() {
        let _ = reactor.del_read(fe);
    }
    if bit.is_writable() {
        let _ = reactor.del_write(fe);
    }

    let was_empty = {
        let mut revents = pfd.revents.lock().unwrap();
        let was_empty = revents.is_empty();
        revents.insert(bit);
        was_empty
    };

    // Only drop the cross-link once every requested direction has fired;
    // a still-outstanding direction keeps it alive for its own callback.
    let other_direction_outstanding = (bit.is_readable() && pfd.requested.is_writable())
        || (bit.is_writable() && pfd.requested.is_readable());
    if !other_direction_outstanding {
        *fe.binding.lock().unwrap() = None;
    }

    if was_empty {
        binding.owner.ready.fetch_add(1);
    }
    Some(binding.owner.fiber.clone())
}

/// The `poll` entry point. Accepts `(fds, timeout_ms)` with the same
/// argument meaning as the platform's kernel `poll` syscall:
/// `timeout_ms < 0` waits indefinitely, `0` is a non-blocking probe, `> 0`
/// bounds the wait. Returns the count of descriptors with non-zero
/// `revents`, or `-1` if the calling fiber was killed while suspended.
///
/// Callers in passthrough mode (`hooks_enabled == false`) should call
/// [`hook::real_poll`] directly instead of this function; this is the
/// hooked slow path only.
pub fn poll(
    reactor: &Reactor,
    file_events: &FileEventRegistry,
    active: &ActivePollList,
    scheduler: &Scheduler,
    fds: &mut [PollFdRequest],
    timeout_ms: i64,
) -> io::Result<i32> {
    if fds.is_empty() && timeout_ms >= 0 {
        if timeout_ms > 0 {
            std::thread::sleep(Duration::from_millis(timeout_ms as u64));
        }
        return Ok(0);
    }
    // `timeout_ms < 0` with no descriptors still waits indefinitely, matching
    // `poll(NULL, 0, -1)`; fall through to the general suspend/cancel path
    // below with zero PollFds registered, so cancellation is the only exit.

    // Non-blocking probe: never allocate adapter state or suspend the
    // fiber (tested separately from the general wait loop below).
    if timeout_ms == 0 {
        return hook::real_poll(fds, 0);
    }

    let fiber = scheduler.current_fiber();

    let mut pfds = Vec::with_capacity(fds.len());
    for req in fds.iter() {
        let fe = file_events.open(req.fd);
        pfds.push(PollFd {
            requested: req.events,
            file_event: fe,
            revents: Mutex::new(Ready::empty()),
        });
    }

    let shared = Arc::new(PollEventShared {
        fds: pfds,
        fiber: fiber.clone(),
        ready: AtomicI64Cell::new(0),
    });

    for (index, pfd) in shared.fds.iter().enumerate() {
        *pfd.file_event.binding.lock().unwrap() = Some(PollBinding {
            owner: Arc::clone(&shared),
            index,
        });
        if pfd.requested.is_readable() {
            reactor.add_read(&pfd.file_event)?;
        }
        if pfd.requested.is_writable() {
            reactor.add_write(&pfd.file_event)?;
        }
    }

    if timeout_ms > 0 {
        active.lower_deadline(Instant::now() + Duration::from_millis(timeout_ms as u64));
    }

    let begin = Instant::now();
    let mut key = active.prepend(Arc::clone(&shared));

    let result = loop {
        shared.ready.set(0);
        scheduler.io_block_inc();
        scheduler.switch_out(&fiber);

        // Every wake leaves the active list; re-entry on a spurious wake
        // re-inserts below, so membership always matches "suspended".
        active.detach(key);

        if scheduler.is_killed(&fiber) {
            // A readiness callback's resume already decremented this counter;
            // a plain kill() does not, so this path must do it itself.
            scheduler.io_block_dec();
            log::info!(
                "fiber {} cancelled while polling {} descriptor(s)",
                fiber.id(),
                shared.fds.len()
            );
            break -1;
        }

        active.clear_if_empty();

        let ready = shared.ready.get();
        if ready != 0 {
            break ready as i32;
        }

        let elapsed = begin.elapsed();
        if timeout_ms > 0 && elapsed >= Duration::from_millis(timeout_ms as u64) {
            break 0;
        }

        key = active.prepend(Arc::clone(&shared));
    };

    for pfd in &shared.fds {
        if pfd.file_event.binding.lock().unwrap().take().is_some() {
            let _ = reactor.del_read(&pfd.file_event);
            let _ = reactor.del_write(&pfd.file_event);
        }
    }

    for (req, pfd) in fds.iter_mut().zip(shared.fds.iter()) {
        req.revents = *pfd.revents.lock().unwrap();
    }

    Ok(result)
}
