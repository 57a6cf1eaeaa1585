//! RESP-2 reply encoding.
//!
//! Replies are appended to the connection's write buffer; the reactor flushes
//! that buffer opportunistically, so encoders never touch the socket.

use bytes::BytesMut;

/// `+<text>\r\n`
pub fn simple_string(buf: &mut BytesMut, text: &[u8]) {
    buf.reserve(text.len() + 3);
    buf.extend_from_slice(b"+");
    buf.extend_from_slice(text);
    buf.extend_from_slice(b"\r\n");
}

/// `-ERR <message>\r\n`
pub fn error(buf: &mut BytesMut, message: &str) {
    buf.reserve(message.len() + 8);
    buf.extend_from_slice(b"-ERR ");
    buf.extend_from_slice(message.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

/// `:<decimal>\r\n`
pub fn integer(buf: &mut BytesMut, value: i64) {
    let mut digits = itoa::Buffer::new();
    let formatted = digits.format(value);
    buf.reserve(formatted.len() + 3);
    buf.extend_from_slice(b":");
    buf.extend_from_slice(formatted.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

/// `$<len>\r\n<bytes>\r\n`
pub fn bulk_string(buf: &mut BytesMut, value: &[u8]) {
    let mut digits = itoa::Buffer::new();
    let formatted = digits.format(value.len());
    buf.reserve(1 + formatted.len() + 2 + value.len() + 2);
    buf.extend_from_slice(b"$");
    buf.extend_from_slice(formatted.as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(value);
    buf.extend_from_slice(b"\r\n");
}

/// `$-1\r\n`, the "no such value" sentinel.
pub fn null_bulk(buf: &mut BytesMut) {
    buf.extend_from_slice(b"$-1\r\n");
}
