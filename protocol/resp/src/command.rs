//! Server-side command mapping.
//!
//! Maps a parsed request frame onto a typed [`Command`]. Command names are
//! matched case-insensitively; keys and values reference the frame's
//! underlying buffer, so no allocation happens on this path.

use crate::error::ParseError;
use crate::frame::{Frame, ParseOptions};

/// Maximum key length accepted by the server (512 KiB).
pub const MAX_KEY_LEN: usize = 512 * 1024;

/// A parsed command with references to the original buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// PING \[message\]
    Ping { message: Option<&'a [u8]> },
    /// GET key
    Get { key: &'a [u8] },
    /// SET key value
    Set { key: &'a [u8], value: &'a [u8] },
    /// DEL key
    Del { key: &'a [u8] },
    /// QUIT
    Quit,
}

impl<'a> Command<'a> {
    /// Map an argument vector onto a command.
    ///
    /// # Errors
    ///
    /// Returns `WrongArity` or `UnknownCommand` for well-formed frames that
    /// do not map onto a served command; both are recoverable, the caller
    /// keeps the connection open after sending the error reply.
    pub fn from_frame(frame: &Frame<'a>) -> Result<Self, ParseError> {
        let args = frame.args();
        let name = args[0];

        let command = match () {
            _ if name.eq_ignore_ascii_case(b"ping") => match args.len() {
                1 => Command::Ping { message: None },
                2 => Command::Ping {
                    message: Some(args[1]),
                },
                _ => return Err(ParseError::WrongArity("ping")),
            },

            _ if name.eq_ignore_ascii_case(b"get") => {
                if args.len() != 2 {
                    return Err(ParseError::WrongArity("get"));
                }
                Command::Get {
                    key: checked_key(args[1])?,
                }
            }

            _ if name.eq_ignore_ascii_case(b"set") => {
                if args.len() != 3 {
                    return Err(ParseError::WrongArity("set"));
                }
                Command::Set {
                    key: checked_key(args[1])?,
                    value: args[2],
                }
            }

            _ if name.eq_ignore_ascii_case(b"del") => {
                if args.len() != 2 {
                    return Err(ParseError::WrongArity("del"));
                }
                Command::Del {
                    key: checked_key(args[1])?,
                }
            }

            _ if name.eq_ignore_ascii_case(b"quit") => {
                if args.len() != 1 {
                    return Err(ParseError::WrongArity("quit"));
                }
                Command::Quit
            }

            _ => {
                return Err(ParseError::UnknownCommand(
                    String::from_utf8_lossy(name).into_owned(),
                ));
            }
        };

        Ok(command)
    }

    /// Parse a frame and map it in one step. Convenience for tests and
    /// callers that do not need the raw argument vector.
    pub fn parse(
        buffer: &'a [u8],
        options: &ParseOptions,
    ) -> Result<(Self, usize), ParseError> {
        let (frame, consumed) = Frame::parse(buffer, options)?;
        let command = Self::from_frame(&frame)?;
        Ok((command, consumed))
    }

    /// Returns the command name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping { .. } => "PING",
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::Quit => "QUIT",
        }
    }
}

fn checked_key(key: &[u8]) -> Result<&[u8], ParseError> {
    if key.is_empty() {
        return Err(ParseError::InvalidKey("empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(ParseError::InvalidKey("too long"));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &[u8]) -> Result<(Command<'_>, usize), ParseError> {
        Command::parse(data, &ParseOptions::default())
    }

    #[test]
    fn test_parse_ping() {
        let data = b"*1\r\n$4\r\nPING\r\n";
        let (cmd, consumed) = parse(data).unwrap();
        assert_eq!(cmd, Command::Ping { message: None });
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_parse_ping_with_message() {
        let data = b"*2\r\n$4\r\nPING\r\n$5\r\nhello\r\n";
        let (cmd, consumed) = parse(data).unwrap();
        assert_eq!(
            cmd,
            Command::Ping {
                message: Some(b"hello")
            }
        );
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_parse_get() {
        let data = b"*2\r\n$3\r\nGET\r\n$5\r\nmykey\r\n";
        let (cmd, consumed) = parse(data).unwrap();
        assert_eq!(cmd, Command::Get { key: b"mykey" });
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_parse_set() {
        let data = b"*3\r\n$3\r\nSET\r\n$5\r\nmykey\r\n$7\r\nmyvalue\r\n";
        let (cmd, consumed) = parse(data).unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                key: b"mykey",
                value: b"myvalue",
            }
        );
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_parse_set_empty_value() {
        let data = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$0\r\n\r\n";
        let (cmd, _) = parse(data).unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                key: b"k",
                value: b"",
            }
        );
    }

    #[test]
    fn test_parse_del() {
        let data = b"*2\r\n$3\r\nDEL\r\n$5\r\nmykey\r\n";
        let (cmd, consumed) = parse(data).unwrap();
        assert_eq!(cmd, Command::Del { key: b"mykey" });
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_parse_quit() {
        let data = b"*1\r\n$4\r\nQUIT\r\n";
        let (cmd, consumed) = parse(data).unwrap();
        assert_eq!(cmd, Command::Quit);
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_parse_case_insensitive() {
        let (cmd, _) = parse(b"*2\r\n$3\r\nget\r\n$5\r\nmykey\r\n").unwrap();
        assert_eq!(cmd, Command::Get { key: b"mykey" });

        let (cmd, _) = parse(b"*2\r\n$3\r\nGeT\r\n$5\r\nmykey\r\n").unwrap();
        assert_eq!(cmd, Command::Get { key: b"mykey" });

        let (cmd, _) = parse(b"*1\r\n$4\r\nquit\r\n").unwrap();
        assert_eq!(cmd, Command::Quit);
    }

    #[test]
    fn test_parse_incomplete() {
        assert!(matches!(
            parse(b"*2\r\n$3\r\nGET"),
            Err(ParseError::Incomplete)
        ));
        assert!(matches!(parse(b"*2\r\n"), Err(ParseError::Incomplete)));
        assert!(matches!(parse(b""), Err(ParseError::Incomplete)));
    }

    #[test]
    fn test_parse_unknown_command() {
        let data = b"*1\r\n$7\r\nUNKNOWN\r\n";
        assert!(matches!(parse(data), Err(ParseError::UnknownCommand(_))));
    }

    #[test]
    fn test_parse_wrong_arity() {
        // GET with no key
        assert!(matches!(
            parse(b"*1\r\n$3\r\nGET\r\n"),
            Err(ParseError::WrongArity("get"))
        ));
        // SET with only a key
        assert!(matches!(
            parse(b"*2\r\n$3\r\nSET\r\n$1\r\nk\r\n"),
            Err(ParseError::WrongArity("set"))
        ));
        // SET with a trailing extra argument
        assert!(matches!(
            parse(b"*4\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$1\r\nx\r\n"),
            Err(ParseError::WrongArity("set"))
        ));
        // DEL with no key
        assert!(matches!(
            parse(b"*1\r\n$3\r\nDEL\r\n"),
            Err(ParseError::WrongArity("del"))
        ));
        // PING with two extra arguments
        assert!(matches!(
            parse(b"*3\r\n$4\r\nPING\r\n$1\r\na\r\n$1\r\nb\r\n"),
            Err(ParseError::WrongArity("ping"))
        ));
    }

    #[test]
    fn test_parse_empty_key_rejected() {
        assert!(matches!(
            parse(b"*2\r\n$3\r\nGET\r\n$0\r\n\r\n"),
            Err(ParseError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_parse_binary_key() {
        let data = b"*2\r\n$3\r\nGET\r\n$4\r\n\x00\xff\r\n\r\n";
        let (cmd, _) = parse(data).unwrap();
        assert_eq!(
            cmd,
            Command::Get {
                key: b"\x00\xff\r\n"
            }
        );
    }

    #[test]
    fn test_command_name() {
        assert_eq!(Command::Ping { message: None }.name(), "PING");
        assert_eq!(Command::Get { key: b"k" }.name(), "GET");
        assert_eq!(
            Command::Set {
                key: b"k",
                value: b"v"
            }
            .name(),
            "SET"
        );
        assert_eq!(Command::Del { key: b"k" }.name(), "DEL");
        assert_eq!(Command::Quit.name(), "QUIT");
    }

    #[test]
    fn test_byte_by_byte_feed_yields_same_commands() {
        // Two pipelined commands fed one byte at a time parse at exactly the
        // same boundaries as when fed whole.
        let stream = b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*2\r\n$3\r\nGET\r\n$1\r\na\r\n";
        let mut buf: Vec<u8> = Vec::new();
        let mut parsed = Vec::new();

        for &byte in stream.iter() {
            buf.push(byte);
            loop {
                match Command::parse(&buf, &ParseOptions::default()) {
                    Ok((cmd, consumed)) => {
                        parsed.push(cmd.name());
                        buf.drain(..consumed);
                    }
                    Err(ParseError::Incomplete) => break,
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
        }

        assert_eq!(parsed, vec!["SET", "GET"]);
        assert!(buf.is_empty());
    }
}
