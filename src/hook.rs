//! The passthrough boundary: delegates straight to the kernel `poll(2)`,
//! bypassing every adapter structure.
//!
//! A real syscall-interposition layer (`dlsym(RTLD_NEXT, "poll")`) is out of
//! scope; there is no dynamic symbol to resolve in a statically linked Rust
//! binary, so the once-guarded "resolve the real poll" dance from
//! `lib_fiber/c/src/hook/poll.c`'s `hook_init()` is reduced to a single
//! logged marker the first time this path is exercised.

use std::io;
use std::sync::Once;

use crate::epoll::Ready;
use crate::poll_adapter::PollFdRequest;

static HOOK_INIT: Once = Once::new();

fn note_first_use() {
    HOOK_INIT.call_once(|| {
        log::debug!("poll passthrough active: delegating to libc::poll");
    });
}

fn ready_to_poll_events(r: Ready) -> libc::c_short {
    let mut bits: libc::c_short = 0;
    if r.is_readable() {
        bits |= libc::POLLIN as libc::c_short;
    }
    if r.is_writable() {
        bits |= libc::POLLOUT as libc::c_short;
    }
    bits
}

fn poll_revents_to_ready(bits: libc::c_short) -> Ready {
    let bits = bits as libc::c_int;
    let mut r = Ready::empty();
    if bits & libc::POLLIN != 0 {
        r.insert(Ready::readable());
    }
    if bits & libc::POLLOUT != 0 {
        r.insert(Ready::writable());
    }
    if bits & libc::POLLERR != 0 {
        r.insert(Ready::error());
    }
    if bits & (libc::POLLHUP | libc::POLLRDHUP) != 0 {
        r.insert(Ready::hup());
    }
    r
}

/// Runs the real kernel `poll(2)` over `fds`, writing `revents` back in
/// place. Used both for genuine passthrough mode and for a non-blocking
/// probe (`timeout_ms == 0`), which never needs the suspend machinery.
pub fn real_poll(fds: &mut [PollFdRequest], timeout_ms: i64) -> io::Result<i32> {
    note_first_use();

    let mut raw: Vec<libc::pollfd> = fds
        .iter()
        .map(|f| libc::pollfd {
            fd: f.fd,
            events: ready_to_poll_events(f.events),
            revents: 0,
        })
        .collect();

    let timeout = if timeout_ms < 0 {
        -1
    } else {
        timeout_ms as libc::c_int
    };

    let n = loop {
        let res = unsafe { libc::poll(raw.as_mut_ptr(), raw.len() as libc::nfds_t, timeout) };
        if res == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        break res;
    };

    for (req, raw) in fds.iter_mut().zip(raw.iter()) {
        req.revents = poll_revents_to_ready(raw.revents);
    }

    Ok(n)
}
