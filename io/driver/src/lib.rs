//! Readiness-based I/O for the reactor.
//!
//! The driver multiplexes a listening socket and many client connections
//! onto one thread: the caller polls, drains completions, and performs
//! non-blocking reads and writes through [`IoDriver`]. The only shipped
//! implementation is [`MioDriver`] (epoll on Linux, kqueue elsewhere),
//! registered edge-triggered so callers drain sockets until `WouldBlock`.

pub mod driver;
pub mod mio;
pub mod types;

pub use driver::IoDriver;
pub use mio::MioDriver;
pub use types::{Completion, CompletionKind, ConnId, ListenerId};
