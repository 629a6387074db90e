//! Wire protocol for the core publish/subscribe transport.
//!
//! This is intentionally minimal: framing of `INFO`/`PUB`/`SUB`/`MSG`/`PING`/`PONG`
//! lines, enough to drive request/reply and subscription delivery. Reconnection,
//! TLS and authentication are handled above this layer, if at all; this module
//! only turns bytes into [`ServerOp`] values and back.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use subslice::SubsliceExt;
use tokio_util::codec::{Decoder, Encoder};

/// Information the server sends in its initial `INFO` line and on every
/// subsequent async `INFO` update (e.g. cluster topology changes).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub max_payload: usize,
    #[serde(default)]
    pub proto: i8,
    #[serde(default)]
    pub client_id: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectInfo {
    pub verbose: bool,
    pub pedantic: bool,
    pub lang: &'static str,
    pub version: &'static str,
    pub protocol: i8,
    pub echo: bool,
}

/// A single decoded server operation.
#[derive(Debug, Clone)]
pub enum ServerOp {
    Info(Box<ServerInfo>),
    Msg {
        subject: String,
        sid: u64,
        reply: Option<String>,
        payload: Bytes,
    },
    Ping,
    Pong,
    Ok,
    Err(String),
}

enum DecodeState {
    Control,
    Payload {
        subject: String,
        sid: u64,
        reply: Option<String>,
        len: usize,
    },
}

pub struct ProtocolCodec {
    state: DecodeState,
}

impl Default for ProtocolCodec {
    fn default() -> Self {
        ProtocolCodec {
            state: DecodeState::Control,
        }
    }
}

#[derive(Debug)]
pub struct ProtocolError(pub String);

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol error: {}", self.0)
    }
}

impl std::error::Error for ProtocolError {}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError(e.to_string())
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.find(b"\r\n")
}

impl Decoder for ProtocolCodec {
    type Item = ServerOp;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match &self.state {
                DecodeState::Control => {
                    let idx = match find_crlf(src) {
                        Some(idx) => idx,
                        None => return Ok(None),
                    };
                    let line = src.split_to(idx);
                    src.advance(2); // skip CRLF
                    let line = String::from_utf8_lossy(&line).into_owned();
                    let mut parts = line.splitn(2, char::is_whitespace);
                    let verb = parts.next().unwrap_or_default().to_ascii_uppercase();
                    let rest = parts.next().unwrap_or_default().trim();
                    match verb.as_str() {
                        "INFO" => {
                            let info: ServerInfo = serde_json::from_str(rest)
                                .map_err(|e| ProtocolError(format!("bad INFO: {e}")))?;
                            return Ok(Some(ServerOp::Info(Box::new(info))));
                        }
                        "PING" => return Ok(Some(ServerOp::Ping)),
                        "PONG" => return Ok(Some(ServerOp::Pong)),
                        "+OK" => return Ok(Some(ServerOp::Ok)),
                        "-ERR" => return Ok(Some(ServerOp::Err(rest.trim_matches('\'').to_string()))),
                        "MSG" => {
                            let fields: Vec<&str> = rest.split_whitespace().collect();
                            let (subject, sid, reply, len) = match fields.as_slice() {
                                [subject, sid, len] => (
                                    subject.to_string(),
                                    sid.parse::<u64>()
                                        .map_err(|_| ProtocolError("bad sid".into()))?,
                                    None,
                                    len.parse::<usize>()
                                        .map_err(|_| ProtocolError("bad len".into()))?,
                                ),
                                [subject, sid, reply, len] => (
                                    subject.to_string(),
                                    sid.parse::<u64>()
                                        .map_err(|_| ProtocolError("bad sid".into()))?,
                                    Some(reply.to_string()),
                                    len.parse::<usize>()
                                        .map_err(|_| ProtocolError("bad len".into()))?,
                                ),
                                _ => return Err(ProtocolError(format!("malformed MSG: {line}"))),
                            };
                            self.state = DecodeState::Payload {
                                subject,
                                sid,
                                reply,
                                len,
                            };
                        }
                        other => {
                            return Err(ProtocolError(format!("unknown op: {other}")));
                        }
                    }
                }
                DecodeState::Payload { len, .. } => {
                    let len = *len;
                    if src.len() < len + 2 {
                        return Ok(None);
                    }
                    let payload = src.split_to(len).freeze();
                    src.advance(2);
                    let state = std::mem::replace(&mut self.state, DecodeState::Control);
                    if let DecodeState::Payload {
                        subject, sid, reply, ..
                    } = state
                    {
                        return Ok(Some(ServerOp::Msg {
                            subject,
                            sid,
                            reply,
                            payload,
                        }));
                    }
                    unreachable!()
                }
            }
        }
    }
}

/// A single encoded client command ready to be written to the socket.
pub enum ClientOp {
    Connect(ConnectInfo),
    Pub {
        subject: String,
        reply: Option<String>,
        payload: Bytes,
    },
    Sub {
        subject: String,
        queue: Option<String>,
        sid: u64,
    },
    Unsub {
        sid: u64,
        max_msgs: Option<u64>,
    },
    Ping,
    Pong,
}

impl Encoder<ClientOp> for ProtocolCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: ClientOp, dst: &mut BytesMut) -> Result<(), Self::Error> {
        use std::io::Write;
        match item {
            ClientOp::Connect(info) => {
                let json = serde_json::to_string(&info)
                    .map_err(|e| ProtocolError(format!("bad CONNECT: {e}")))?;
                write!(dst.writer(), "CONNECT {json}\r\n")?;
            }
            ClientOp::Pub {
                subject,
                reply,
                payload,
            } => {
                let mut len_buf = itoa::Buffer::new();
                let len = len_buf.format(payload.len());
                match reply {
                    Some(reply) => write!(dst.writer(), "PUB {subject} {reply} {len}\r\n")?,
                    None => write!(dst.writer(), "PUB {subject} {len}\r\n")?,
                }
                dst.extend_from_slice(&payload);
                dst.extend_from_slice(b"\r\n");
            }
            ClientOp::Sub { subject, queue, sid } => match queue {
                Some(queue) => write!(dst.writer(), "SUB {subject} {queue} {sid}\r\n")?,
                None => write!(dst.writer(), "SUB {subject} {sid}\r\n")?,
            },
            ClientOp::Unsub { sid, max_msgs } => match max_msgs {
                Some(n) => write!(dst.writer(), "UNSUB {sid} {n}\r\n")?,
                None => write!(dst.writer(), "UNSUB {sid}\r\n")?,
            },
            ClientOp::Ping => write!(dst.writer(), "PING\r\n")?,
            ClientOp::Pong => write!(dst.writer(), "PONG\r\n")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_msg_without_reply() {
        let mut codec = ProtocolCodec::default();
        let mut buf = BytesMut::from(&b"MSG foo.bar 9 5\r\nhello\r\n"[..]);
        let op = codec.decode(&mut buf).unwrap().unwrap();
        match op {
            ServerOp::Msg {
                subject,
                sid,
                reply,
                payload,
            } => {
                assert_eq!(subject, "foo.bar");
                assert_eq!(sid, 9);
                assert_eq!(reply, None);
                assert_eq!(&payload[..], b"hello");
            }
            _ => panic!("expected Msg"),
        }
    }

    #[test]
    fn decodes_msg_with_reply() {
        let mut codec = ProtocolCodec::default();
        let mut buf = BytesMut::from(&b"MSG foo.bar 9 _INBOX.1 5\r\nhello\r\n"[..]);
        let op = codec.decode(&mut buf).unwrap().unwrap();
        match op {
            ServerOp::Msg { reply, .. } => assert_eq!(reply.as_deref(), Some("_INBOX.1")),
            _ => panic!("expected Msg"),
        }
    }

    #[test]
    fn decodes_partial_then_complete() {
        let mut codec = ProtocolCodec::default();
        let mut buf = BytesMut::from(&b"MSG foo 1 5\r\nhe"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"llo\r\n");
        let op = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(op, ServerOp::Msg { .. }));
    }

    #[test]
    fn decodes_ping_pong_ok_err() {
        let mut codec = ProtocolCodec::default();
        let mut buf = BytesMut::from(&b"PING\r\nPONG\r\n+OK\r\n-ERR 'bad'\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf).unwrap().unwrap(),
            ServerOp::Ping
        ));
        assert!(matches!(
            codec.decode(&mut buf).unwrap().unwrap(),
            ServerOp::Pong
        ));
        assert!(matches!(codec.decode(&mut buf).unwrap().unwrap(), ServerOp::Ok));
        match codec.decode(&mut buf).unwrap().unwrap() {
            ServerOp::Err(msg) => assert_eq!(msg, "bad"),
            _ => panic!("expected Err"),
        }
    }

    #[test]
    fn encodes_pub_with_reply() {
        let mut codec = ProtocolCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(
                ClientOp::Pub {
                    subject: "foo".to_string(),
                    reply: Some("_INBOX.1".to_string()),
                    payload: Bytes::from_static(b"hi"),
                },
                &mut buf,
            )
            .unwrap();
        assert_eq!(&buf[..], b"PUB foo _INBOX.1 2\r\nhi\r\n");
    }
}
