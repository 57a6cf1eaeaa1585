//! The driver trait: readiness-based I/O behind a uniform completion API.

use crate::types::{Completion, ConnId, ListenerId};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// A readiness-based I/O driver.
///
/// The reactor owns one driver, polls it for completions, and performs all
/// reads and writes through it. Connections accepted on a listener are
/// registered automatically and surfaced via [`CompletionKind::Accept`].
///
/// The seam exists so a different multiplexer can slot in without touching
/// the reactor; only the mio implementation ships today.
///
/// [`CompletionKind::Accept`]: crate::types::CompletionKind::Accept
pub trait IoDriver {
    /// Start listening on `addr` with the given accept backlog.
    fn listen(&mut self, addr: SocketAddr, backlog: u32) -> io::Result<ListenerId>;

    /// Stop listening and deregister the listener.
    fn close_listener(&mut self, id: ListenerId) -> io::Result<()>;

    /// Close and deregister a connection. Idempotent.
    fn close(&mut self, id: ConnId) -> io::Result<()>;

    /// Write as much of `data` as the socket accepts.
    ///
    /// Returns the number of bytes written; `WouldBlock` when the socket's
    /// send buffer is full (a `SendReady` completion follows once it drains).
    fn send(&mut self, id: ConnId, data: &[u8]) -> io::Result<usize>;

    /// Read into `buf`. Returns `Ok(0)` on peer close and `WouldBlock` when
    /// the socket is drained.
    fn recv(&mut self, id: ConnId, buf: &mut [u8]) -> io::Result<usize>;

    /// Wait for readiness, accepting pending connections along the way.
    /// Returns the number of completions gathered.
    fn poll(&mut self, timeout: Option<Duration>) -> io::Result<usize>;

    /// Take the completions gathered by the last poll.
    fn drain_completions(&mut self) -> Vec<Completion>;

    /// Number of live connections.
    fn connection_count(&self) -> usize;
}
