//! The envelope every JetStream API reply is wrapped in, and the date-time
//! parsing helper used to decode server timestamps.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use time::OffsetDateTime;

use super::error::Error;

/// A server timestamp that refuses to fail a deserialize: if the server
/// sends something `time` cannot parse, the field falls back to the Unix
/// epoch's proleptic-Gregorian floor (`-62135596800`) rather than aborting
/// the whole response.
const UNPARSEABLE_TIME_FALLBACK: i64 = -62_135_596_800;

pub fn deserialize_time<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(parse_server_time(&raw))
}

pub fn deserialize_time_opt<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(|raw| parse_server_time(&raw)))
}

fn parse_server_time(raw: &str) -> OffsetDateTime {
    OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| {
            OffsetDateTime::from_unix_timestamp(UNPARSEABLE_TIME_FALLBACK)
                .expect("fallback timestamp is in range")
        })
}

/// Every JetStream API response, success or failure, is this envelope: the
/// type-specific fields alongside an optional `error` object.
///
/// This can't be a `#[serde(flatten)]` struct: flattening `Option<T>`
/// deserializes `T` against whatever fields remain, so an error-only reply
/// (an empty remaining map) would fail `T`'s own required fields with a
/// "missing field" error instead of falling through to `error`. Peeking at
/// the raw JSON first and branching on whether `error` is present avoids
/// that.
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub value: Option<T>,
    pub error: Option<ApiError>,
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Response<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        if let Some(error) = raw.get("error") {
            let error: ApiError =
                serde_json::from_value(error.clone()).map_err(serde::de::Error::custom)?;
            return Ok(Response {
                value: None,
                error: Some(error),
            });
        }

        let value: T = serde_json::from_value(raw).map_err(serde::de::Error::custom)?;
        Ok(Response {
            value: Some(value),
            error: None,
        })
    }
}

impl<T> Response<T> {
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Unwraps into the success payload, or the JetStream [`Error`] the
    /// server reported.
    pub fn into_result(self) -> Result<T, Error> {
        match self.error {
            Some(err) => Err(err.into()),
            None => self
                .value
                .ok_or_else(|| Error::InvalidState("response had neither a value nor an error".into())),
        }
    }
}

/// Parses a raw JSON reply payload into a [`Response<T>`] and unwraps it,
/// the shape every management call in [`super::context::Context`] needs.
pub fn parse_response<T: DeserializeOwned>(payload: &[u8]) -> Result<T, Error> {
    let response: Response<T> = serde_json::from_slice(payload)
        .map_err(|e| Error::InvalidState(format!("malformed JetStream API response: {e}")))?;
    response.into_result()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: u64,
    #[serde(default)]
    pub err_code: Option<u64>,
    #[serde(default)]
    pub description: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description, self.code)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_on_unparseable_time() {
        let parsed = parse_server_time("not a timestamp");
        assert_eq!(parsed.unix_timestamp(), UNPARSEABLE_TIME_FALLBACK);
    }

    #[test]
    fn parses_rfc3339() {
        let parsed = parse_server_time("2023-01-01T00:00:00Z");
        assert_eq!(parsed.unix_timestamp(), 1_672_531_200);
    }

    #[test]
    fn parses_fractional_seconds_with_zulu_offset() {
        let parsed = parse_server_time("2021-01-20T23:41:08.579594Z");
        assert_eq!(parsed.unix_timestamp(), 1_611_186_068);
    }

    #[test]
    fn parses_fractional_seconds_with_numeric_offset() {
        let parsed = parse_server_time("2021-02-02T11:18:28.347722551-08:00");
        assert_eq!(parsed.unix_timestamp(), 1_612_293_508);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        #[serde(rename = "type")]
        kind: String,
    }

    #[test]
    fn success_response_round_trips() {
        let raw = br#"{"type":"io.nats.jetstream.api.v1.stream_create_response"}"#;
        let value: Payload = parse_response(raw).unwrap();
        assert_eq!(value.kind, "io.nats.jetstream.api.v1.stream_create_response");
    }

    #[test]
    fn error_response_surfaces_server_error() {
        let raw = br#"{"error":{"code":404,"err_code":10059,"description":"stream not found"}}"#;
        let err = parse_response::<Payload>(raw).unwrap_err();
        match err {
            Error::Server { code, description } => {
                assert_eq!(code, 404);
                assert_eq!(description, "stream not found");
            }
            other => panic!("expected Server error, got {other:?}"),
        }
    }

    #[test]
    fn error_response_surfaces_for_types_with_required_fields() {
        use super::super::publish::Ack;

        let raw = br#"{"error":{"code":404,"description":"stream not found"}}"#;
        let err = parse_response::<Ack>(raw).unwrap_err();
        assert!(matches!(err, Error::Server { code: 404, .. }));
    }
}
