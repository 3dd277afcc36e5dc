//! Core of a user-space fiber I/O runtime: a word-sized atomic cell used
//! for cross-fiber/thread signalling, and the poll-multiplexing adapter
//! that turns a blocking, multi-descriptor `poll`-style wait into a
//! cooperative suspension point driven by an epoll reactor.
//!
//! The syscall-interception mechanism, the fiber scheduler's stackful
//! context switching, and portability beyond Linux epoll are out of scope;
//! [`fiber::Scheduler`] and [`hook::real_poll`] stand in for the first two
//! with a safe, testable approximation documented in their own modules.
//!
//! # Example
//!
//! ```no_run
//! use std::os::unix::io::AsRawFd;
//! use std::os::unix::net::UnixStream;
//!
//! use fiber_poll_io::epoll::Ready;
//! use fiber_poll_io::poll_adapter::PollFdRequest;
//! use fiber_poll_io::runtime::{Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
//! runtime.scheduler().enter_fiber();
//!
//! let (a, _b) = UnixStream::pair().unwrap();
//! let mut fds = vec![PollFdRequest::new(a.as_raw_fd(), Ready::readable())];
//!
//! // Non-blocking probe: returns immediately, no fiber suspended.
//! let ready = runtime.poll(&mut fds, 0).unwrap();
//! assert_eq!(ready, 0);
//! ```

pub mod atomic;
pub mod epoll;
mod sys;

pub mod fiber;
pub mod file_event;
pub mod hook;
pub mod poll_adapter;
pub mod reactor;
pub mod runtime;

pub use atomic::{AtomicCell, AtomicI64Cell};
pub use epoll::{Epoll, EpollOpt, Event, Events, Ready, Token};
pub use fiber::{FiberHandle, Scheduler};
pub use file_event::{FileEvent, FileEventRegistry};
pub use poll_adapter::{poll, PollFdRequest};
pub use reactor::{ActivePollList, Reactor};
pub use runtime::{Runtime, RuntimeConfig};
