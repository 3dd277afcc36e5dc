//! Runtime wiring: owns the reactor, the file-event registry, the active
//! poll list and the fiber scheduler, and drives one iteration of the
//! event loop.
//!
//! Grounded on `mio::Poll`, which plays the same role of owning a selector
//! plus the registry it dispatches through, reached via a single `poll`
//! entry point per tick. The hook-state flag is kept as an explicit field
//! here rather than ambient global state, so tests can toggle passthrough
//! mode per scenario without cross-test interference.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::epoll::{Event, Events, Ready};
use crate::file_event::FileEventRegistry;
use crate::fiber::Scheduler;
use crate::hook;
use crate::poll_adapter::{self, PollFdRequest};
use crate::reactor::{ActivePollList, Reactor};

/// Tunables for a [`Runtime`]. Mirrors the way callers size an
/// [`Events`](crate::epoll::Events) buffer up front in `mio`.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Size of the buffer `run_once` passes to the reactor's epoll wait.
    pub events_capacity: usize,
    /// Starting value of the hook passthrough switch.
    pub hooks_enabled: bool,
}

impl Default for RuntimeConfig {
    fn default() -> RuntimeConfig {
        RuntimeConfig {
            events_capacity: 1024,
            hooks_enabled: true,
        }
    }
}

/// Owns every collaborator the poll adapter needs and drives the reactor's
/// dispatch loop.
pub struct Runtime {
    reactor: Reactor,
    file_events: FileEventRegistry,
    active: ActivePollList,
    scheduler: Scheduler,
    hooks_enabled: AtomicBool,
    config: RuntimeConfig,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> io::Result<Runtime> {
        Ok(Runtime {
            reactor: Reactor::new()?,
            file_events: FileEventRegistry::new(),
            active: ActivePollList::new(),
            scheduler: Scheduler::new(),
            hooks_enabled: AtomicBool::new(config.hooks_enabled),
            config,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn hooks_enabled(&self) -> bool {
        self.hooks_enabled.load(Ordering::Acquire)
    }

    pub fn set_hooks_enabled(&self, enabled: bool) {
        self.hooks_enabled.store(enabled, Ordering::Release);
    }

    /// The entry point a hooked `poll(2)` call site is routed through.
    /// Implements the "Fast paths" half of the adapter's entry contract:
    /// in passthrough mode, delegates straight to the kernel call without
    /// allocating any adapter state.
    pub fn poll(&self, fds: &mut [PollFdRequest], timeout_ms: i64) -> io::Result<i32> {
        if !self.hooks_enabled() {
            return hook::real_poll(fds, timeout_ms);
        }

        poll_adapter::poll(
            &self.reactor,
            &self.file_events,
            &self.active,
            &self.scheduler,
            fds,
            timeout_ms,
        )
    }

    /// Runs one iteration of the reactor's dispatch loop: waits for kernel
    /// readiness (bounded by the shortest outstanding poll deadline),
    /// fires the matching callbacks, resumes every fiber that became
    /// runnable as a result, then separately resumes anything whose
    /// deadline has now passed.
    pub fn run_once(&self) -> io::Result<()> {
        let mut events = Events::with_capacity(self.config.events_capacity);
        let wait = self.next_wait();

        self.reactor.wait(&mut events, wait)?;

        for event in events.iter() {
            self.dispatch(event);
        }

        self.expire_deadlines();

        Ok(())
    }

    fn next_wait(&self) -> Option<Duration> {
        self.active.current_deadline().map(|deadline| {
            let now = std::time::Instant::now();
            if deadline > now {
                deadline - now
            } else {
                Duration::from_millis(0)
            }
        })
    }

    fn dispatch(&self, event: Event) {
        let kind = event.readiness();
        let fd = event.token().0 as std::os::unix::io::RawFd;
        let fe = self.file_events.open(fd);

        let error_bits = kind & (Ready::error() | Ready::hup());
        let mut resumed = Vec::new();

        if !error_bits.is_empty() {
            resumed.extend(poll_adapter::error_callback(&self.reactor, &fe, kind));
        } else {
            // A single wake can carry both directions (e.g. a socket that
            // is simultaneously readable and writable); fire both.
            if kind.is_readable() {
                resumed.extend(poll_adapter::read_callback(&self.reactor, &fe));
            }
            if kind.is_writable() {
                resumed.extend(poll_adapter::write_callback(&self.reactor, &fe));
            }
        }

        // Dedup: a dual-direction PollFd firing both callbacks in the same
        // wake must still resume its fiber (and decrement its counter)
        // exactly once.
        let mut already_resumed: Vec<crate::fiber::FiberHandle> = Vec::new();
        for fiber in resumed {
            if !already_resumed.iter().any(|f| *f == fiber) {
                self.scheduler.resume(&fiber);
                already_resumed.push(fiber);
            }
        }
    }

    fn expire_deadlines(&self) {
        let Some(deadline) = self.active.current_deadline() else {
            return;
        };
        if std::time::Instant::now() < deadline {
            return;
        }

        let mut expired = Vec::new();
        self.active.for_each(|shared| expired.push(shared));
        for shared in expired {
            self.scheduler.resume(shared.fiber());
        }
        self.active.clear_if_empty();
    }
}
