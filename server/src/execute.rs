//! Command execution - bridges protocol commands to store operations.

use bytes::BytesMut;
use cache_core::Store;
use protocol_resp::{reply, Command};

/// Execute one command against the store, appending the reply to
/// `write_buf`. Returns true when the connection should close after the
/// reply is flushed (QUIT).
pub fn execute(cmd: &Command<'_>, store: &mut Store, write_buf: &mut BytesMut) -> bool {
    match cmd {
        Command::Ping { message: None } => {
            reply::simple_string(write_buf, b"PONG");
        }
        Command::Ping {
            message: Some(message),
        } => {
            reply::simple_string(write_buf, message);
        }
        Command::Get { key } => match store.get(key) {
            Some(value) => reply::bulk_string(write_buf, value),
            None => reply::null_bulk(write_buf),
        },
        Command::Set { key, value } => {
            store.set(key, value);
            reply::simple_string(write_buf, b"OK");
        }
        Command::Del { key } => {
            let removed = store.del(key);
            reply::integer(write_buf, if removed { 1 } else { 0 });
        }
        Command::Quit => {
            reply::simple_string(write_buf, b"OK");
            return true;
        }
    }
    false
}
