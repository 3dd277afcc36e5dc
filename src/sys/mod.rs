//! Thin platform layer. Only Linux epoll is supported.

/// Turns a negative libc return into `io::Error::last_os_error()`. Callers
/// that can observe `EINTR` (the epoll wait loop) retry it themselves.
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

mod epoll;

pub use epoll::{Epoll, Events};
