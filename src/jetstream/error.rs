//! The JetStream-specific error taxonomy.
//!
//! Every fallible JetStream operation returns this [`Error`] rather than the
//! bare transport [`crate::Error`], so callers can match on what actually
//! went wrong (a timeout vs. a server-side rejection vs. a local
//! misconfiguration) instead of downcasting a boxed trait object.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// No reply arrived within the request timeout.
    Timeout,
    /// The account queried does not have JetStream enabled.
    JetStreamNotEnabled,
    /// A caller-supplied argument failed local validation before any
    /// request was sent (e.g. a stream name containing `.` or `*`).
    InvalidArgument(String),
    /// The subscription or consumer is not in a state that allows the
    /// requested operation (e.g. pulling from a push consumer).
    InvalidState(String),
    /// The server rejected the request with a JetStream API error.
    Server { code: u64, description: String },
    /// The server responded but the resource named does not exist.
    NotFound(String),
    /// A message's `Nats-Stream` header did not match the subscription's
    /// expected stream; the delivery is almost certainly misrouted.
    StreamMismatch { expected: String, received: String },
    /// A delivered message had no reply subject, or an ack was sent to one
    /// that the server no longer recognizes.
    InvalidAck(String),
    /// The subscription was torn down (consumer deleted, client dropped)
    /// while an operation was in flight.
    Interrupted,
    /// Failure at the transport layer: connection loss, a malformed frame,
    /// or anything else below the JetStream protocol.
    Transport(crate::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => write!(f, "timed out waiting for a response"),
            Error::JetStreamNotEnabled => write!(f, "JetStream is not enabled for this account"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Error::Server { code, description } => {
                write!(f, "server error {code}: {description}")
            }
            Error::NotFound(what) => write!(f, "not found: {what}"),
            Error::StreamMismatch { expected, received } => write!(
                f,
                "stream mismatch: expected {expected}, message came from {received}"
            ),
            Error::InvalidAck(msg) => write!(f, "invalid ack: {msg}"),
            Error::Interrupted => write!(f, "subscription was interrupted"),
            Error::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<crate::Error> for Error {
    fn from(e: crate::Error) -> Self {
        Error::Transport(e)
    }
}

impl From<super::response::ApiError> for Error {
    fn from(e: super::response::ApiError) -> Self {
        Error::Server {
            code: e.code,
            description: e.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_displays_code_and_description() {
        let err = Error::Server {
            code: 404,
            description: "stream not found".into(),
        };
        assert_eq!(err.to_string(), "server error 404: stream not found");
    }

    #[test]
    fn stream_mismatch_names_both_streams() {
        let err = Error::StreamMismatch {
            expected: "orders".into(),
            received: "events".into(),
        };
        assert!(err.to_string().contains("orders"));
        assert!(err.to_string().contains("events"));
    }
}
