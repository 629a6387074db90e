//! Publishing messages onto a stream and the acknowledgement the server
//! sends back.

use bytes::Bytes;
use serde::Deserialize;

use super::context::Context;
use super::error::Error;
use super::options::PublishOptions;
use super::response::parse_response;

#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    #[serde(rename = "stream")]
    pub stream: String,
    #[serde(rename = "seq")]
    pub sequence: u64,
    #[serde(default)]
    pub duplicate: bool,
}

impl Context {
    pub async fn publish(&self, subject: impl Into<String>, payload: Bytes) -> Result<Ack, Error> {
        self.publish_with_options(subject, payload, PublishOptions::default())
            .await
    }

    /// Publishes `payload` to `subject` and waits for the server's stream
    /// acknowledgement, applying whatever [`PublishOptions`] the caller set.
    ///
    /// Six steps, matching the control flow the server itself expects:
    /// resolve the timeout, send the request, detect a timed-out request,
    /// parse the ack envelope, reject a malformed ack (empty stream or zero
    /// sequence) as invalid, and finally check the ack's stream name against
    /// any expectation the caller set.
    ///
    /// `expected_stream` is checked against the ack client-side rather than
    /// enforced by the server: real `Nats-Expected-Stream`/`Nats-Msg-Id`
    /// headers need NATS's `HPUB`/`HMSG` framing, which this crate's
    /// transport (see [`crate::proto`]) doesn't implement.
    pub async fn publish_with_options(
        &self,
        subject: impl Into<String>,
        payload: Bytes,
        options: PublishOptions,
    ) -> Result<Ack, Error> {
        let subject = subject.into();
        if !crate::subject::is_valid_subject(&subject) {
            return Err(Error::InvalidArgument(format!(
                "invalid publish subject: {subject:?}"
            )));
        }

        let request_timeout = options.timeout.unwrap_or(self.options().request_timeout);

        let reply = self
            .client()
            .request(subject, payload, request_timeout)
            .await
            .map_err(Error::Transport)?;

        let reply = reply.ok_or(Error::Timeout)?;

        let ack: Ack = parse_response(&reply.payload)?;
        validate_ack(&ack)?;

        if let Some(expected) = &options.expected_stream {
            if expected != &ack.stream {
                return Err(Error::StreamMismatch {
                    expected: expected.clone(),
                    received: ack.stream,
                });
            }
        }

        Ok(ack)
    }
}

/// Rejects an ack the server couldn't actually have meant: an empty stream
/// name or a zero sequence number both indicate a malformed reply rather
/// than a real publish.
fn validate_ack(ack: &Ack) -> Result<(), Error> {
    if ack.stream.is_empty() || ack.sequence == 0 {
        return Err(Error::InvalidAck(format!(
            "malformed publish ack: stream={:?} sequence={}",
            ack.stream, ack.sequence
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ack_with_duplicate_defaulted_false() {
        let raw = br#"{"stream":"orders","seq":42}"#;
        let ack: Ack = parse_response(raw).unwrap();
        assert_eq!(ack.stream, "orders");
        assert_eq!(ack.sequence, 42);
        assert!(!ack.duplicate);
    }

    #[test]
    fn parses_duplicate_ack() {
        let raw = br#"{"stream":"orders","seq":42,"duplicate":true}"#;
        let ack: Ack = parse_response(raw).unwrap();
        assert!(ack.duplicate);
    }

    #[test]
    fn rejects_ack_with_empty_stream() {
        let raw = br#"{"stream":"","seq":0}"#;
        let ack: Ack = parse_response(raw).unwrap();
        match validate_ack(&ack) {
            Err(Error::InvalidAck(_)) => {}
            other => panic!("expected InvalidAck, got {other:?}"),
        }
    }

    #[test]
    fn rejects_ack_with_zero_sequence() {
        let raw = br#"{"stream":"orders","seq":0}"#;
        let ack: Ack = parse_response(raw).unwrap();
        assert!(matches!(validate_ack(&ack), Err(Error::InvalidAck(_))));
    }

    #[test]
    fn accepts_well_formed_ack() {
        let raw = br#"{"stream":"orders","seq":42}"#;
        let ack: Ack = parse_response(raw).unwrap();
        assert!(validate_ack(&ack).is_ok());
    }
}
