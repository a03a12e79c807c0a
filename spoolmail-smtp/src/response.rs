//! SMTP reply parsing and representation.

use std::fmt;

use crate::error::{ClientError, Result};

/// A single line of an SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// Whether this is the last line in a multi-line reply.
    pub is_last: bool,
    pub message: String,
}

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The reply text with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// `true` for 3xx replies, which ask the client to go on (DATA, AUTH).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Keep a 2xx reply, classify anything else as an error.
    ///
    /// # Errors
    /// The classified [`ClientError`] for a non-2xx reply
    pub fn ensure_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::from_reply(self))
        }
    }

    /// Keep a 3xx reply, classify anything else as an error.
    ///
    /// # Errors
    /// The classified [`ClientError`] for a non-3xx reply
    pub fn ensure_intermediate(self) -> Result<Self> {
        if self.is_intermediate() {
            Ok(self)
        } else {
            Err(ClientError::from_reply(self))
        }
    }

    /// Parses a single reply line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Parse` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let (Some(code), rest) = (line.get(..3), line.get(3..).unwrap_or_default()) else {
            return Err(ClientError::Parse(format!(
                "Response line too short: '{line}'"
            )));
        };

        let code = code
            .parse::<u16>()
            .map_err(|_| ClientError::Parse(format!("Invalid status code: '{code}'")))?;

        let mut rest = rest.chars();
        let is_last = match rest.next() {
            None | Some(' ') => true,
            Some('-') => false,
            Some(c) => {
                return Err(ClientError::Parse(format!(
                    "Invalid separator character: '{c}'"
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: rest.as_str().to_string(),
        })
    }

    /// Parses a complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` if
    /// the buffer does not hold a complete reply yet.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Parse` if the reply is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut code = None;
        let mut consumed = 0;

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = Self::parse_line(std::str::from_utf8(raw)?)?;

            match code {
                Some(expected) if expected != line.code => {
                    return Err(ClientError::Parse(format!(
                        "Status code mismatch in multi-line response: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
                None => code = Some(line.code),
            }

            lines.push(line.message);

            if line.is_last {
                return Ok(Some((Self::new(line.code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line() {
        let line = ResponseLine {
            code: 220,
            is_last: true,
            message: "mail.example.com ESMTP".to_string(),
        };
        assert_eq!(
            Response::parse_line("220 mail.example.com ESMTP").unwrap(),
            line
        );
        assert!(Response::parse_line("220").unwrap().is_last);
        assert!(Response::parse_line("22").is_err());
        assert!(Response::parse_line("2x0 nope").is_err());
        assert!(Response::parse_line("250+nope").is_err());
    }

    #[test]
    fn test_parse_multi_line_response() {
        let data = b"250-mail.example.com\r\n250-AUTH PLAIN LOGIN\r\n250 HELP\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(
            response.lines,
            vec!["mail.example.com", "AUTH PLAIN LOGIN", "HELP"]
        );
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_parse_leaves_following_reply() {
        let data = b"250 OK\r\n354 Go ahead\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(response.to_string(), "250 OK");
        assert_eq!(consumed, 8);
    }

    #[test]
    fn test_parse_incomplete_response() {
        assert!(Response::parse_response(b"250-mail.example.com\r\n250-SIZE")
            .unwrap()
            .is_none());
        assert!(Response::parse_response(b"").unwrap().is_none());
    }

    #[test]
    fn test_parse_code_mismatch() {
        assert!(Response::parse_response(b"250-first\r\n251 second\r\n").is_err());
    }

    #[test]
    fn test_ensure() {
        let ok = Response::new(250, vec!["OK".to_string()]);
        assert!(ok.clone().ensure_success().is_ok());
        assert!(matches!(ok.ensure_intermediate(), Err(ClientError::Unknown(_))));

        let go_ahead = Response::new(354, vec!["Go ahead".to_string()]);
        assert!(go_ahead.ensure_intermediate().is_ok());

        let busy = Response::new(421, vec!["Try later".to_string()]);
        assert!(matches!(busy.ensure_success(), Err(ClientError::ServerBusy(_))));
    }
}
