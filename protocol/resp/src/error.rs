//! Parse error types.

/// Errors produced while parsing RESP request data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing. Nothing was consumed.
    #[error("incomplete")]
    Incomplete,

    /// The framing itself is broken (wrong leading byte, missing CRLF, ...).
    /// There is no way to resynchronise, so the connection must be closed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A length field is not a valid non-negative decimal integer.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// A bulk string exceeds the configured limit.
    #[error("bulk string too long ({len} bytes, max {max})")]
    BulkStringTooLong { len: usize, max: usize },

    /// A well-formed frame carried the wrong number of arguments for its
    /// command.
    #[error("wrong number of args for '{0}'")]
    WrongArity(&'static str),

    /// A well-formed frame named a command we do not serve.
    #[error("unknown command")]
    UnknownCommand(String),

    /// The key argument is empty or exceeds the key size bound.
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),
}

impl ParseError {
    /// True when the error leaves the input stream unrecoverable and the
    /// connection should be closed after the error reply is sent.
    ///
    /// Arity and unknown-command errors occur after a complete frame was
    /// consumed, so the connection can keep serving subsequent commands.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ParseError::Protocol(_)
                | ParseError::InvalidInteger(_)
                | ParseError::BulkStringTooLong { .. }
        )
    }
}
