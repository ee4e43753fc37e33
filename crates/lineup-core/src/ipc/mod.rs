//! Wire protocol between clients and the daemon.
//!
//! Length-prefix-framed JSON over a Unix socket. The transport in front of
//! the daemon authenticates the caller and stamps the identity into the
//! request envelope; the daemon trusts the envelope the way the original
//! platform trusted its invocation context.

use serde::{Deserialize, Serialize};

use crate::signup::SignupError;

/// One framed request as it arrives at the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Authenticated caller identity, or `None` for anonymous callers.
    pub caller_id: Option<String>,

    /// The request itself.
    pub request: SpotRequest,
}

/// Client request to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpotRequest {
    /// Liveness check.
    Ping,

    /// Take or give up a spot on a list.
    ManageSpot {
        /// Target list id.
        list_id: String,
        /// Target slot in wire form, e.g. `"3"` or `"W1"`.
        spot_key: String,
        /// `"signup"` or `"remove"`.
        action: String,
    },

    /// Shut the daemon down.
    Shutdown,
}

/// Daemon response to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpotResponse {
    /// Liveness answer.
    Pong {
        /// Daemon version.
        version: String,
        /// Daemon uptime in seconds.
        uptime_secs: u64,
    },

    /// Operation success.
    Ok {
        /// Action-specific confirmation for the caller.
        message: String,
    },

    /// Operation failure.
    Error {
        /// Machine-readable kind.
        code: ErrorCode,
        /// Caller-facing message.
        message: String,
    },
}

/// Caller-facing error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No caller identity present.
    Unauthenticated,
    /// Missing or malformed input fields.
    InvalidArgument,
    /// Referenced list does not exist.
    NotFound,
    /// Slot already occupied, or caller already holds a slot.
    AlreadyExists,
    /// Caller tried to release a slot they do not occupy.
    FailedPrecondition,
    /// Any other failure.
    Internal,
}

impl ErrorCode {
    /// HTTP-style status for gateways that translate the socket protocol.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::InvalidArgument => 400,
            Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::FailedPrecondition => 412,
            Self::Internal => 500,
        }
    }
}

impl From<&SignupError> for ErrorCode {
    fn from(err: &SignupError) -> Self {
        match err {
            SignupError::Unauthenticated => Self::Unauthenticated,
            SignupError::InvalidArgument { .. } => Self::InvalidArgument,
            SignupError::ListNotFound { .. } => Self::NotFound,
            SignupError::AlreadySignedUp | SignupError::SpotTaken { .. } => Self::AlreadyExists,
            SignupError::NotOccupant { .. } => Self::FailedPrecondition,
            SignupError::Internal { .. } => Self::Internal,
        }
    }
}

/// Frame a message for transport.
///
/// Format: 4-byte big-endian length prefix + JSON payload.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // frames are far below 4GB
pub fn frame_message(message: &[u8]) -> Vec<u8> {
    let len = message.len() as u32;
    let mut framed = Vec::with_capacity(4 + message.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(message);
    framed
}

/// Parse a framed message length.
///
/// Returns the payload length if a complete length prefix is present.
#[must_use]
pub fn parse_frame_length(buffer: &[u8]) -> Option<usize> {
    if buffer.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
    Some(len as usize)
}

/// Protocol-level errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error on the socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload was not valid JSON for the expected type.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed frame.
    #[error("protocol error: {0}")]
    Frame(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_prepends_big_endian_length() {
        let framed = frame_message(b"hello");

        assert_eq!(framed.len(), 4 + 5);
        assert_eq!(&framed[0..4], &[0, 0, 0, 5]);
        assert_eq!(&framed[4..], b"hello");
    }

    #[test]
    fn frame_length_parses_only_complete_prefixes() {
        let framed = frame_message(b"test message");

        assert_eq!(parse_frame_length(&framed), Some(12));
        assert_eq!(parse_frame_length(&[0, 0, 1, 0]), Some(256));
        assert_eq!(parse_frame_length(&[1, 2, 3]), None);
    }

    #[test]
    fn request_round_trips_as_tagged_json() {
        let envelope = RequestEnvelope {
            caller_id: Some("uid-1".to_string()),
            request: SpotRequest::ManageSpot {
                list_id: "list-1".to_string(),
                spot_key: "3".to_string(),
                action: "signup".to_string(),
            },
        };

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("manage_spot"));

        let parsed: RequestEnvelope = serde_json::from_str(&json).unwrap();
        match parsed.request {
            SpotRequest::ManageSpot { list_id, .. } => assert_eq!(list_id, "list-1"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn error_codes_map_to_http_statuses() {
        assert_eq!(ErrorCode::Unauthenticated.http_status(), 401);
        assert_eq!(ErrorCode::InvalidArgument.http_status(), 400);
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::AlreadyExists.http_status(), 409);
        assert_eq!(ErrorCode::FailedPrecondition.http_status(), 412);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
    }

    #[test]
    fn signup_errors_map_to_wire_codes() {
        use crate::slot::SlotKey;

        let cases = [
            (SignupError::Unauthenticated, ErrorCode::Unauthenticated),
            (SignupError::AlreadySignedUp, ErrorCode::AlreadyExists),
            (
                SignupError::SpotTaken {
                    key: SlotKey::Main(1),
                },
                ErrorCode::AlreadyExists,
            ),
            (
                SignupError::NotOccupant {
                    key: SlotKey::Main(1),
                },
                ErrorCode::FailedPrecondition,
            ),
            (
                SignupError::ListNotFound {
                    list_id: "x".to_string(),
                },
                ErrorCode::NotFound,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(ErrorCode::from(&err), code);
        }
    }
}
