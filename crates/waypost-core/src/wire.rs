//! waypost peer wire format.
//!
//! A producer connection opens with a 4-byte protocol magic, then sends
//! newline-terminated text commands. Every command is answered with a
//! length-prefixed envelope: a big-endian `u32` byte count followed by the
//! payload. Success payloads are `OK` or a JSON document; errors are the
//! error code, optionally followed by a space and a description.
//!
//! Nothing in this module performs I/O. Sessions parse with [`Command::parse`]
//! and frame with [`frame`].

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::names::{is_valid_channel_name, is_valid_topic_name};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Magic announcing protocol version 1. Two spaces, then `V1`.
pub const MAGIC_V1: [u8; 4] = *b"  V1";

/// Size of the protocol magic prefix.
pub const MAGIC_LEN: usize = 4;

/// Size of the envelope length prefix and of the IDENTIFY body length.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest IDENTIFY body accepted.
pub const MAX_BODY_SIZE: u32 = 1024 * 1024;

/// Longest command line accepted, newline included.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Success payload for every command except IDENTIFY.
pub const OK: &[u8] = b"OK";

// ── Error codes ───────────────────────────────────────────────────────────────

/// Error codes sent back to a peer. The wire form is the `E_*` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Unknown command, wrong argument count, or wrong session state.
    Invalid,
    /// Unsupported protocol magic.
    BadProtocol,
    /// IDENTIFY body missing, oversized, or malformed.
    BadBody,
    BadTopic,
    BadChannel,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Invalid => "E_INVALID",
            ErrorCode::BadProtocol => "E_BAD_PROTOCOL",
            ErrorCode::BadBody => "E_BAD_BODY",
            ErrorCode::BadTopic => "E_BAD_TOPIC",
            ErrorCode::BadChannel => "E_BAD_CHANNEL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol violation by the peer.
///
/// Every protocol error ends the session: the session writes
/// [`ProtocolError::payload`] as the final response and closes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {desc}")]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub desc: String,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, desc: impl Into<String>) -> Self {
        Self {
            code,
            desc: desc.into(),
        }
    }

    pub fn invalid(desc: impl Into<String>) -> Self {
        Self::new(ErrorCode::Invalid, desc)
    }

    pub fn bad_body(desc: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadBody, desc)
    }

    /// Response text sent to the peer: `CODE` or `CODE description`.
    pub fn payload(&self) -> Vec<u8> {
        if self.desc.is_empty() {
            self.code.as_str().as_bytes().to_vec()
        } else {
            format!("{} {}", self.code, self.desc).into_bytes()
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Followed on the wire by a length-prefixed JSON [`IdentifyBody`].
    Identify,
    Ping,
    Register {
        topic: String,
        channel: Option<String>,
    },
    Unregister {
        topic: String,
        channel: Option<String>,
    },
}

impl Command {
    /// Parse one command line. Surrounding whitespace (including the
    /// trailing `\r\n`) is ignored; arguments are separated by single spaces.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut params = line.trim().split(' ');
        let name = params.next().unwrap_or_default();
        let args: Vec<&str> = params.collect();

        match name {
            "IDENTIFY" => Ok(Command::Identify),
            "PING" => Ok(Command::Ping),
            "REGISTER" => {
                let (topic, channel) = topic_and_channel(name, &args)?;
                Ok(Command::Register { topic, channel })
            }
            "UNREGISTER" => {
                let (topic, channel) = topic_and_channel(name, &args)?;
                Ok(Command::Unregister { topic, channel })
            }
            other => Err(ProtocolError::invalid(format!("invalid command {other}"))),
        }
    }

    /// Command name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Identify => "IDENTIFY",
            Command::Ping => "PING",
            Command::Register { .. } => "REGISTER",
            Command::Unregister { .. } => "UNREGISTER",
        }
    }
}

fn topic_and_channel(
    command: &str,
    args: &[&str],
) -> Result<(String, Option<String>), ProtocolError> {
    let (topic, channel) = match args {
        [] => {
            return Err(ProtocolError::invalid(format!(
                "{command} insufficient number of params"
            )))
        }
        [topic] => (*topic, None),
        [topic, channel] => (*topic, Some(*channel)),
        _ => {
            return Err(ProtocolError::invalid(format!(
                "{command} too many params"
            )))
        }
    };

    if !is_valid_topic_name(topic) {
        return Err(ProtocolError::new(
            ErrorCode::BadTopic,
            format!("{command} topic name '{topic}' is not valid"),
        ));
    }
    if let Some(channel) = channel {
        if !is_valid_channel_name(channel) {
            return Err(ProtocolError::new(
                ErrorCode::BadChannel,
                format!("{command} channel name '{channel}' is not valid"),
            ));
        }
    }

    Ok((topic.to_string(), channel.map(str::to_string)))
}

// ── IDENTIFY ──────────────────────────────────────────────────────────────────

/// JSON body a producer sends after `IDENTIFY`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifyBody {
    pub broadcast_address: String,
    pub hostname: String,
    pub tcp_port: u16,
    pub http_port: u16,
    pub version: String,
}

impl IdentifyBody {
    /// Decode and check an IDENTIFY body.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let parsed: IdentifyBody = serde_json::from_slice(body)
            .map_err(|_| ProtocolError::bad_body("IDENTIFY failed to decode JSON body"))?;
        if parsed.broadcast_address.is_empty()
            || parsed.tcp_port == 0
            || parsed.http_port == 0
            || parsed.version.is_empty()
        {
            return Err(ProtocolError::bad_body("IDENTIFY missing fields"));
        }
        Ok(parsed)
    }
}

/// The node's own description, returned as the IDENTIFY response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub tcp_port: u16,
    pub http_port: u16,
    pub version: String,
    pub broadcast_address: String,
    pub hostname: String,
}

// ── Framing ───────────────────────────────────────────────────────────────────

/// Wrap a payload in the length-prefixed response envelope.
pub fn frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
