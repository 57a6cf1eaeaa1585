//! The single-threaded reactor loop.
//!
//! One thread owns the driver, every connection, and the store. The loop
//! waits for readiness, accepts until the listener drains, reads each ready
//! client until `WouldBlock`, runs the parse-execute-reply cycle, and flushes
//! replies opportunistically with per-connection buffering for short writes.
//!
//! Per-connection failures tear down that connection only; the loop itself
//! exits on the shutdown flag, then persists the disk index.

use crate::config::Config;
use crate::connection::Connection;
use cache_core::Store;
use io_driver::{CompletionKind, ConnId, IoDriver, MioDriver};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// How long a poll may sleep before the shutdown flag is rechecked.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Run the server until `shutdown` is set.
///
/// Returns an error only for fatal startup or multiplexer failures (the
/// caller exits non-zero); clean shutdown persists the index and returns Ok.
pub fn run(config: &Config, mut store: Store, shutdown: Arc<AtomicBool>) -> io::Result<()> {
    let mut driver = MioDriver::with_capacity(8192)?;
    let listener_id = driver.listen(config.server.address, config.server.backlog)?;
    info!(address = %driver.local_addr(listener_id)?, "listening");

    let max_request_size = config.server.max_request_size;

    // Connection slots indexed by ConnId. The driver reuses slab indices as
    // connections close, so a Vec with holes gives O(1) lookup.
    let mut connections: Vec<Option<Connection>> = Vec::with_capacity(1024);
    let mut recv_buf = vec![0u8; READ_BUFFER_SIZE];

    while !shutdown.load(Ordering::Relaxed) {
        driver.poll(Some(POLL_TIMEOUT))?;

        for completion in driver.drain_completions() {
            match completion.kind {
                CompletionKind::Accept { conn_id, addr, .. } => {
                    debug!(conn = conn_id.as_usize(), peer = %addr, "accepted");
                    let idx = conn_id.as_usize();
                    if idx >= connections.len() {
                        connections.resize_with(idx + 1, || None);
                    }
                    connections[idx] =
                        Some(Connection::new(READ_BUFFER_SIZE, max_request_size));
                }

                CompletionKind::Recv { conn_id } => {
                    handle_recv(
                        &mut driver,
                        &mut connections,
                        &mut store,
                        &mut recv_buf,
                        conn_id,
                    );
                }

                CompletionKind::SendReady { conn_id } => {
                    handle_send_ready(&mut driver, &mut connections, &mut store, conn_id);
                }

                CompletionKind::Closed { conn_id } => {
                    close_connection(&mut driver, &mut connections, conn_id);
                }

                CompletionKind::Error { conn_id, error } => {
                    debug!(conn = conn_id.as_usize(), error = %error, "connection error");
                    close_connection(&mut driver, &mut connections, conn_id);
                }

                CompletionKind::ListenerError { error, .. } => {
                    warn!(error = %error, "listener error");
                }
            }
        }
    }

    info!("draining");
    let _ = driver.close_listener(listener_id);

    let stats = store.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        disk_reads = stats.disk_reads,
        disk_writes = stats.disk_writes,
        hot = stats.hot_size,
        warm = stats.warm_size,
        "final store statistics"
    );

    if let Err(e) = store.persist_index() {
        error!(error = %e, "failed to persist disk index");
    }

    Ok(())
}

/// Read until `WouldBlock`, processing and replying inline.
fn handle_recv(
    driver: &mut MioDriver,
    connections: &mut [Option<Connection>],
    store: &mut Store,
    recv_buf: &mut [u8],
    conn_id: ConnId,
) {
    let idx = conn_id.as_usize();

    // Backpressure or pending teardown: leave the data in the socket until
    // SendReady drains our side.
    let should_process = connections
        .get(idx)
        .and_then(|c| c.as_ref())
        .map(|c| c.should_read() && !c.should_close())
        .unwrap_or(false);
    if !should_process {
        return;
    }

    let mut need_close = false;

    'recv_loop: loop {
        let Some(conn) = connections.get_mut(idx).and_then(|c| c.as_mut()) else {
            break;
        };

        match driver.recv(conn_id, recv_buf) {
            Ok(0) => {
                // Peer closed.
                need_close = true;
                break;
            }
            Ok(n) => {
                conn.append_recv_data(&recv_buf[..n]);
                conn.process(store);

                while conn.has_pending_write() {
                    match driver.send(conn_id, conn.pending_write_data()) {
                        Ok(sent) => conn.advance_write(sent),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(_) => {
                            need_close = true;
                            break 'recv_loop;
                        }
                    }
                }

                if conn.should_close() {
                    // Close now if the goodbye reply is out; otherwise wait
                    // for SendReady to flush it.
                    need_close = !conn.has_pending_write();
                    break;
                }

                if !conn.should_read() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(_) => {
                need_close = true;
                break;
            }
        }
    }

    if need_close {
        close_connection(driver, connections, conn_id);
    }
}

/// Flush buffered replies after the socket became writable again, then
/// resume processing anything the backpressure cap paused.
fn handle_send_ready(
    driver: &mut MioDriver,
    connections: &mut [Option<Connection>],
    store: &mut Store,
    conn_id: ConnId,
) {
    let idx = conn_id.as_usize();
    let mut need_close = false;

    loop {
        let Some(conn) = connections.get_mut(idx).and_then(|c| c.as_mut()) else {
            return;
        };
        if !conn.has_pending_write() {
            break;
        }
        match driver.send(conn_id, conn.pending_write_data()) {
            Ok(sent) => conn.advance_write(sent),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(_) => {
                need_close = true;
                break;
            }
        }
    }

    if need_close {
        close_connection(driver, connections, conn_id);
        return;
    }

    {
        let Some(conn) = connections.get_mut(idx).and_then(|c| c.as_mut()) else {
            return;
        };
        if conn.should_close() {
            if !conn.has_pending_write() {
                close_connection(driver, connections, conn_id);
            }
            return;
        }
        if !conn.should_read() {
            return;
        }
        conn.process(store);
    }

    // Push out anything the resumed processing produced.
    loop {
        let Some(conn) = connections.get_mut(idx).and_then(|c| c.as_mut()) else {
            return;
        };
        if !conn.has_pending_write() {
            break;
        }
        match driver.send(conn_id, conn.pending_write_data()) {
            Ok(sent) => conn.advance_write(sent),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(_) => {
                need_close = true;
                break;
            }
        }
    }

    let closing = connections
        .get(idx)
        .and_then(|c| c.as_ref())
        .map(|c| c.should_close() && !c.has_pending_write())
        .unwrap_or(false);

    if need_close || closing {
        close_connection(driver, connections, conn_id);
    }
}

fn close_connection(
    driver: &mut MioDriver,
    connections: &mut [Option<Connection>],
    conn_id: ConnId,
) {
    let idx = conn_id.as_usize();
    if let Some(slot) = connections.get_mut(idx) {
        if slot.take().is_some() {
            debug!(conn = idx, "closing connection");
            let _ = driver.close(conn_id);
        }
    }
}
