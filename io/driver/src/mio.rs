//! Mio-based I/O driver using epoll/kqueue.
//!
//! Sockets are registered edge-triggered (mio's native mode on epoll), so the
//! reactor must read and write until `WouldBlock`; the `readable`/`writable`
//! flags track the last known readiness between events.

use crate::driver::IoDriver;
use crate::types::{Completion, CompletionKind, ConnId, ListenerId};
use mio::net::{TcpListener as MioTcpListener, TcpStream as MioTcpStream};
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::trace;

/// Token offset for listeners to avoid collision with connections.
const LISTENER_TOKEN_OFFSET: usize = 1 << 30;

/// Connection state for the mio driver.
struct MioConnection {
    stream: MioTcpStream,
    readable: bool,
    writable: bool,
}

/// Listener state for the mio driver.
struct MioListener {
    listener: MioTcpListener,
}

/// Mio-based I/O driver (epoll on Linux, kqueue on macOS).
pub struct MioDriver {
    poll: Poll,
    events: Events,
    connections: Slab<MioConnection>,
    listeners: Slab<MioListener>,
    pending_completions: Vec<Completion>,
}

impl MioDriver {
    /// Create a new mio driver with default settings.
    pub fn new() -> io::Result<Self> {
        Self::with_capacity(8192)
    }

    /// Create a new mio driver sized for `max_connections`.
    pub fn with_capacity(max_connections: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(1024),
            connections: Slab::with_capacity(max_connections.min(4096)),
            listeners: Slab::with_capacity(4),
            pending_completions: Vec::with_capacity(256),
        })
    }

    /// The address a listener is bound to. Useful with port 0.
    pub fn local_addr(&self, id: ListenerId) -> io::Result<SocketAddr> {
        let listener = self
            .listeners
            .get(id.as_usize())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "listener not found"))?;
        listener.listener.local_addr()
    }

    /// Accept all pending connections on a listener.
    fn accept_pending(&mut self, listener_id: usize) {
        let listener = match self.listeners.get(listener_id) {
            Some(l) => l,
            None => return,
        };

        loop {
            match listener.listener.accept() {
                Ok((mut stream, addr)) => {
                    let entry = self.connections.vacant_entry();
                    let conn_id = entry.key();

                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        Token(conn_id),
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        self.pending_completions.push(Completion::new(
                            CompletionKind::ListenerError {
                                listener_id: ListenerId::new(listener_id),
                                error: e,
                            },
                        ));
                        continue;
                    }

                    entry.insert(MioConnection {
                        stream,
                        readable: false,
                        writable: true,
                    });

                    trace!(conn = conn_id, peer = %addr, "accepted connection");
                    self.pending_completions
                        .push(Completion::new(CompletionKind::Accept {
                            listener_id: ListenerId::new(listener_id),
                            conn_id: ConnId::new(conn_id),
                            addr,
                        }));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // No more pending connections.
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.pending_completions
                        .push(Completion::new(CompletionKind::ListenerError {
                            listener_id: ListenerId::new(listener_id),
                            error: e,
                        }));
                    break;
                }
            }
        }
    }
}

impl IoDriver for MioDriver {
    fn listen(&mut self, addr: SocketAddr, backlog: u32) -> io::Result<ListenerId> {
        // Build the socket with socket2 so SO_REUSEADDR and the backlog are
        // applied before the listener enters the poll set.
        let socket = socket2::Socket::new(
            match addr {
                SocketAddr::V4(_) => socket2::Domain::IPV4,
                SocketAddr::V6(_) => socket2::Domain::IPV6,
            },
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;

        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog as i32)?;

        let std_listener: std::net::TcpListener = socket.into();
        let mut mio_listener = MioTcpListener::from_std(std_listener);

        let entry = self.listeners.vacant_entry();
        let id = entry.key();

        self.poll.registry().register(
            &mut mio_listener,
            Token(id + LISTENER_TOKEN_OFFSET),
            Interest::READABLE,
        )?;

        entry.insert(MioListener {
            listener: mio_listener,
        });

        Ok(ListenerId::new(id))
    }

    fn close_listener(&mut self, id: ListenerId) -> io::Result<()> {
        if let Some(mut listener) = self.listeners.try_remove(id.as_usize()) {
            self.poll.registry().deregister(&mut listener.listener)?;
        }
        Ok(())
    }

    fn close(&mut self, id: ConnId) -> io::Result<()> {
        if let Some(mut conn) = self.connections.try_remove(id.as_usize()) {
            self.poll.registry().deregister(&mut conn.stream)?;
        }
        Ok(())
    }

    fn send(&mut self, id: ConnId, data: &[u8]) -> io::Result<usize> {
        let conn = self
            .connections
            .get_mut(id.as_usize())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "connection not found"))?;

        if !conn.writable {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }

        match conn.stream.write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                conn.writable = false;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn recv(&mut self, id: ConnId, buf: &mut [u8]) -> io::Result<usize> {
        let conn = self
            .connections
            .get_mut(id.as_usize())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "connection not found"))?;

        match conn.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                conn.readable = false;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn poll(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        self.pending_completions.clear();

        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(e);
        }

        // Collect event info first so accept_pending can borrow self.
        let events: Vec<_> = self
            .events
            .iter()
            .map(|e| {
                (
                    e.token().0,
                    e.is_readable(),
                    e.is_writable(),
                    e.is_read_closed() || e.is_write_closed(),
                    e.is_error(),
                )
            })
            .collect();

        for (token, readable, writable, closed, error) in events {
            if token >= LISTENER_TOKEN_OFFSET {
                let listener_id = token - LISTENER_TOKEN_OFFSET;
                if self.listeners.contains(listener_id) {
                    self.accept_pending(listener_id);
                }
                continue;
            }

            if let Some(conn) = self.connections.get_mut(token) {
                if readable {
                    conn.readable = true;
                    self.pending_completions
                        .push(Completion::new(CompletionKind::Recv {
                            conn_id: ConnId::new(token),
                        }));
                }
                if writable {
                    conn.writable = true;
                    self.pending_completions
                        .push(Completion::new(CompletionKind::SendReady {
                            conn_id: ConnId::new(token),
                        }));
                }
                if closed {
                    self.pending_completions
                        .push(Completion::new(CompletionKind::Closed {
                            conn_id: ConnId::new(token),
                        }));
                }
                if error {
                    self.pending_completions
                        .push(Completion::new(CompletionKind::Error {
                            conn_id: ConnId::new(token),
                            error: io::Error::other("socket error"),
                        }));
                }
            }
        }

        Ok(self.pending_completions.len())
    }

    fn drain_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.pending_completions)
    }

    fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
