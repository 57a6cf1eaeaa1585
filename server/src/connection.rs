//! Per-connection state for the server.
//!
//! Each connection owns a growable read buffer fed by the reactor and a
//! write buffer drained by it. `process` runs the parse-execute-reply cycle
//! over whatever complete commands the read buffer holds.

use bytes::{Buf, BytesMut};
use cache_core::Store;
use protocol_resp::{reply, Command, Frame, ParseError, ParseOptions};
use tracing::{debug, warn};

use crate::execute::execute;

/// Maximum pending write bytes before applying backpressure: processing
/// pauses until the peer drains replies.
pub const MAX_PENDING_WRITE: usize = 256 * 1024;

/// Per-connection state.
pub struct Connection {
    read_buf: BytesMut,
    write_buf: BytesMut,
    write_pos: usize,
    should_close: bool,
    /// Input cap; the connection is dropped when pending request bytes
    /// exceed it.
    max_request_size: usize,
    parse_options: ParseOptions,
}

impl Connection {
    pub fn new(read_buffer_size: usize, max_request_size: usize) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(read_buffer_size),
            write_buf: BytesMut::with_capacity(4096),
            write_pos: 0,
            should_close: false,
            max_request_size,
            parse_options: ParseOptions::default(),
        }
    }

    /// Append received bytes to the read buffer. Oversized request streams
    /// mark the connection for teardown.
    pub fn append_recv_data(&mut self, data: &[u8]) {
        if self.read_buf.len() + data.len() > self.max_request_size {
            warn!(
                pending = self.read_buf.len(),
                incoming = data.len(),
                cap = self.max_request_size,
                "input buffer over capacity, dropping connection"
            );
            self.should_close = true;
            return;
        }
        self.read_buf.extend_from_slice(data);
    }

    /// Parse and execute every complete command in the read buffer.
    pub fn process(&mut self, store: &mut Store) {
        if self.write_pos >= self.write_buf.len() {
            self.write_buf.clear();
            self.write_pos = 0;
        }

        loop {
            if self.should_close || self.read_buf.is_empty() {
                break;
            }

            // Backpressure: stop processing while the peer is slow to drain.
            if self.pending_write_len() > MAX_PENDING_WRITE {
                break;
            }

            let consumed = match Frame::parse(&self.read_buf, &self.parse_options) {
                Ok((frame, consumed)) => {
                    match Command::from_frame(&frame) {
                        Ok(cmd) => {
                            if execute(&cmd, store, &mut self.write_buf) {
                                self.should_close = true;
                            }
                        }
                        Err(e) => {
                            // Complete frame, bad command: reply and move on.
                            reply::error(&mut self.write_buf, &e.to_string());
                        }
                    }
                    consumed
                }
                Err(ParseError::Incomplete) => break,
                Err(e) => {
                    debug!(error = %e, "unrecoverable framing error");
                    reply::error(&mut self.write_buf, &e.to_string());
                    self.should_close = true;
                    self.read_buf.clear();
                    break;
                }
            };
            self.read_buf.advance(consumed);
        }
    }

    /// False while pending replies exceed the backpressure cap.
    pub fn should_read(&self) -> bool {
        self.pending_write_len() <= MAX_PENDING_WRITE
    }

    pub fn pending_write_len(&self) -> usize {
        self.write_buf.len().saturating_sub(self.write_pos)
    }

    pub fn has_pending_write(&self) -> bool {
        self.write_pos < self.write_buf.len()
    }

    pub fn pending_write_data(&self) -> &[u8] {
        &self.write_buf[self.write_pos..]
    }

    pub fn advance_write(&mut self, n: usize) {
        self.write_pos += n;
    }

    pub fn should_close(&self) -> bool {
        self.should_close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store(dir: &std::path::Path) -> Store {
        Store::builder()
            .hot_capacity(2)
            .warm_capacity(2)
            .promotion_threshold(3)
            .data_dir(dir)
            .build()
            .unwrap()
    }

    fn new_conn() -> Connection {
        Connection::new(4096, 1024 * 1024)
    }

    #[test]
    fn test_partial_request() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let mut conn = new_conn();

        conn.append_recv_data(b"*2\r\n$3\r\nGET\r\n$3\r\nke");
        conn.process(&mut store);
        assert!(!conn.has_pending_write());

        conn.append_recv_data(b"y\r\n");
        conn.process(&mut store);
        assert_eq!(conn.pending_write_data(), b"$-1\r\n");
    }

    #[test]
    fn test_byte_by_byte_delivery() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let mut conn = new_conn();

        let stream = b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*2\r\n$3\r\nGET\r\n$1\r\na\r\n";
        for &byte in stream.iter() {
            conn.append_recv_data(&[byte]);
            conn.process(&mut store);
        }

        assert_eq!(conn.pending_write_data(), b"+OK\r\n$1\r\n1\r\n");
        assert!(!conn.should_close());
    }

    #[test]
    fn test_pipelined_requests() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let mut conn = new_conn();

        conn.append_recv_data(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n*2\r\n$3\r\nGET\r\n$3\r\nbar\r\n");
        conn.process(&mut store);
        assert_eq!(conn.pending_write_data(), b"$-1\r\n$-1\r\n");
    }

    #[test]
    fn test_wrong_arity_keeps_connection_open() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let mut conn = new_conn();

        conn.append_recv_data(b"*1\r\n$3\r\nGET\r\n*1\r\n$4\r\nPING\r\n");
        conn.process(&mut store);

        assert_eq!(
            conn.pending_write_data(),
            b"-ERR wrong number of args for 'get'\r\n+PONG\r\n"
        );
        assert!(!conn.should_close());
    }

    #[test]
    fn test_unknown_command_keeps_connection_open() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let mut conn = new_conn();

        conn.append_recv_data(b"*1\r\n$5\r\nHELLO\r\n*1\r\n$4\r\nPING\r\n");
        conn.process(&mut store);

        assert_eq!(
            conn.pending_write_data(),
            b"-ERR unknown command\r\n+PONG\r\n"
        );
        assert!(!conn.should_close());
    }

    #[test]
    fn test_malformed_framing_closes() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let mut conn = new_conn();

        conn.append_recv_data(b"GET foo\r\n");
        conn.process(&mut store);

        assert!(conn.should_close());
        assert!(conn.pending_write_data().starts_with(b"-ERR "));
    }

    #[test]
    fn test_quit_stops_processing() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let mut conn = new_conn();

        // The PING after QUIT must not be served.
        conn.append_recv_data(b"*1\r\n$4\r\nQUIT\r\n*1\r\n$4\r\nPING\r\n");
        conn.process(&mut store);

        assert!(conn.should_close());
        assert_eq!(conn.pending_write_data(), b"+OK\r\n");
    }

    #[test]
    fn test_input_cap_drops_connection() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let mut conn = Connection::new(64, 128);

        conn.append_recv_data(&[b'x'; 256]);
        conn.process(&mut store);
        assert!(conn.should_close());
    }

    #[test]
    fn test_partial_write_advance() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let mut conn = new_conn();

        conn.append_recv_data(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
        conn.process(&mut store);

        let pending = conn.pending_write_data().len();
        conn.advance_write(2);
        assert_eq!(conn.pending_write_data().len(), pending - 2);

        conn.advance_write(pending - 2);
        assert!(!conn.has_pending_write());
    }

    #[test]
    fn test_backpressure_stops_processing() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let mut conn = Connection::new(4096, 64 * 1024 * 1024);

        // Enough misses to overflow the pending-write cap ("$-1\r\n" each).
        let single = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
        let mut many = Vec::new();
        for _ in 0..60_000 {
            many.extend_from_slice(single);
        }
        conn.append_recv_data(&many);
        conn.process(&mut store);

        let pending = conn.pending_write_len();
        assert!(
            pending <= MAX_PENDING_WRITE + 16,
            "pending {} exceeds cap {}",
            pending,
            MAX_PENDING_WRITE
        );
        assert!(!conn.should_read());

        // Drain and resume.
        conn.advance_write(pending);
        conn.process(&mut store);
        assert!(conn.has_pending_write());
    }
}
