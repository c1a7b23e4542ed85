//! Text-frame codec for the broker protocol.
//!
//! A frame is laid out as `VERB\nkey:value\n...\n\nBODY\0\n`. Encoding is
//! deterministic and keeps header insertion order. Decoding lower-cases
//! header keys and honours `content-length` so bodies may carry NUL and
//! newline bytes.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

const TERMINATOR: &[u8] = b"\0\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Connect => "CONNECT",
            Verb::Connected => "CONNECTED",
            Verb::Send => "SEND",
            Verb::Subscribe => "SUBSCRIBE",
            Verb::Unsubscribe => "UNSUBSCRIBE",
            Verb::Message => "MESSAGE",
            Verb::Receipt => "RECEIPT",
            Verb::Error => "ERROR",
            Verb::Disconnect => "DISCONNECT",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Verb::Connect),
            "CONNECTED" => Ok(Verb::Connected),
            "SEND" => Ok(Verb::Send),
            "SUBSCRIBE" => Ok(Verb::Subscribe),
            "UNSUBSCRIBE" => Ok(Verb::Unsubscribe),
            "MESSAGE" => Ok(Verb::Message),
            "RECEIPT" => Ok(Verb::Receipt),
            "ERROR" => Ok(Verb::Error),
            "DISCONNECT" => Ok(Verb::Disconnect),
            other => Err(FrameError::UnknownVerb(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown verb {0:?}")]
    UnknownVerb(String),
    #[error("frame header is not valid utf-8")]
    InvalidUtf8,
    #[error("content-length is {declared} but only {available} body bytes arrived")]
    BodyTooShort { declared: usize, available: usize },
}

/// One unit of the broker's text protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    verb: Verb,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Frame {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a header, replacing the value in place if the key already exists.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((key, value)),
        }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.verb.as_str().as_bytes());
        out.push(b'\n');
        for (key, value) in &self.headers {
            out.extend_from_slice(key.as_bytes());
            out.push(b':');
            out.extend_from_slice(value.as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.extend_from_slice(TERMINATOR);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let mut rest = data;

        // Leading end-of-lines are heart-beats.
        let verb_line = loop {
            if rest.is_empty() {
                return Err(FrameError::Empty);
            }
            let (line, tail) = split_line(rest);
            rest = tail;
            if !line.is_empty() {
                break line;
            }
        };
        let verb: Verb = std::str::from_utf8(verb_line)
            .map_err(|_| FrameError::InvalidUtf8)?
            .trim()
            .parse()?;

        let mut frame = Frame::new(verb);
        while !rest.is_empty() {
            let (line, tail) = split_line(rest);
            rest = tail;
            if line.is_empty() {
                break;
            }
            let line = std::str::from_utf8(line).map_err(|_| FrameError::InvalidUtf8)?;
            if let Some((key, value)) = line.split_once(':') {
                frame.set_header(key.trim().to_lowercase(), value.trim());
            }
        }

        let declared = frame
            .header("content-length")
            .and_then(|raw| match raw.parse::<usize>() {
                Ok(len) => Some(len),
                Err(e) => {
                    warn!("Ignoring content-length {raw:?}: {e}");
                    None
                }
            });

        frame.body = match declared {
            Some(len) if len > rest.len() => {
                return Err(FrameError::BodyTooShort {
                    declared: len,
                    available: rest.len(),
                });
            }
            Some(len) => rest[..len].to_vec(),
            None => match rest.iter().position(|&b| b == 0) {
                Some(end) => rest[..end].to_vec(),
                None => rest.to_vec(),
            },
        };

        Ok(frame)
    }
}

/// Splits off one line, dropping the `\n` and an optional preceding `\r`.
fn split_line(buf: &[u8]) -> (&[u8], &[u8]) {
    let (line, rest) = match buf.iter().position(|&b| b == b'\n') {
        Some(idx) => (&buf[..idx], &buf[idx + 1..]),
        None => (buf, &buf[buf.len()..]),
    };
    (line.strip_suffix(b"\r").unwrap_or(line), rest)
}

/// True for websocket messages that carry only end-of-line bytes.
pub fn is_heartbeat(data: &[u8]) -> bool {
    data.iter().all(|&b| b == b'\n' || b == b'\r')
}
