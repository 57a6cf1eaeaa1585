//! RESP-2 subset codec.
//!
//! Requests are arrays of bulk strings (`*N\r\n$L\r\n<bytes>\r\n...`); replies
//! are simple strings, errors, integers, and bulk strings. Parsing is strictly
//! incremental: a call either consumes one whole well-formed command or
//! consumes nothing, so callers can feed partial reads from a socket buffer
//! and retry as more bytes arrive.

pub mod command;
pub mod error;
pub mod frame;
pub mod reply;

pub use command::Command;
pub use error::ParseError;
pub use frame::{Frame, ParseOptions};
