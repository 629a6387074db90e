// Copyright 2020-2026 The JetStream client authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
//! JetStream is NATS's built-in persistence layer: streams that retain
//! messages, and consumers that track a cursor over them with their own
//! redelivery and acknowledgement policy.
//!
//! Start by creating a [Context], the entrypoint to the JetStream API.
//!
//! # Examples
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! use jetstream_core::jetstream;
//!
//! let client = jetstream_core::connect("localhost:4222").await?;
//! let context = jetstream::new(client).await?;
//!
//! context
//!     .add_stream(jetstream::stream::Config::builder("events").subject("events.*").build()?)
//!     .await?;
//!
//! context.publish("events.created", "data".into()).await?;
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod context;
pub mod error;
pub mod options;
pub mod publish;
pub mod response;
pub mod stream;
pub mod subscription;

use bytes::Bytes;

pub use context::Context;
pub use error::Error;
pub use publish::Ack;
pub use subscription::Subscription;

/// Creates a new JetStream [Context] over `client`, probing the account for
/// JetStream availability with the default API prefix (`$JS.API.`).
pub async fn new(client: crate::Client) -> Result<Context, Error> {
    Context::new(client).await
}

/// Creates a new JetStream [Context] scoped to `domain`, e.g. for a remote
/// leafnode hub: the prefix becomes `$JS.<domain>.API.`.
pub async fn with_domain(client: crate::Client, domain: impl AsRef<str>) -> Result<Context, Error> {
    Context::with_domain(client, domain).await
}

/// Creates a new JetStream [Context] with an explicit API prefix, for
/// accounts that export/import JetStream under a custom subject mapping.
pub async fn with_prefix(client: crate::Client, prefix: impl Into<String>) -> Result<Context, Error> {
    Context::with_prefix(client, prefix).await
}

/// A message delivered through JetStream: the underlying transport message
/// plus the context needed to acknowledge it.
#[derive(Clone)]
pub struct Message {
    pub message: crate::Message,
    pub context: Context,
}

impl std::ops::Deref for Message {
    type Target = crate::Message;

    fn deref(&self) -> &Self::Target {
        &self.message
    }
}

impl From<Message> for crate::Message {
    fn from(source: Message) -> crate::Message {
        source.message
    }
}

impl Message {
    /// Acknowledges the message with `+ACK`. Required for the consumer to
    /// advance under [`consumer::AckPolicy::All`] or
    /// [`consumer::AckPolicy::Explicit`]; a harmless no-op on the wire under
    /// [`consumer::AckPolicy::None`].
    pub async fn ack(&self) -> Result<(), Error> {
        self.ack_with(AckKind::Ack).await
    }

    pub async fn ack_with(&self, kind: AckKind) -> Result<(), Error> {
        match &self.message.reply {
            Some(reply) => self
                .context
                .client()
                .publish(reply.clone(), kind.into())
                .await
                .map_err(Error::Transport),
            None => Err(Error::InvalidAck("message has no reply subject".into())),
        }
    }

    /// Acknowledges the message and waits for the server to confirm receipt
    /// of the ack itself, for callers that need delivery confirmation beyond
    /// fire-and-forget.
    pub async fn double_ack(&self) -> Result<(), Error> {
        let reply = self
            .message
            .reply
            .clone()
            .ok_or_else(|| Error::InvalidAck("message has no reply subject".into()))?;
        let client = self.context.client();
        let inbox = client.new_inbox();
        let mut sub = client.subscribe(inbox.clone()).await.map_err(Error::Transport)?;
        client
            .publish_with_reply(reply, inbox, AckKind::Ack.into())
            .await
            .map_err(Error::Transport)?;
        match sub
            .next_message_timeout(self.context.options().request_timeout)
            .await
        {
            Some(_) => Ok(()),
            None => Err(Error::Timeout),
        }
    }
}

/// The kinds of response used to acknowledge a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    /// The message was completely handled.
    Ack,
    /// Processing failed; redeliver per the consumer's backoff/ack wait.
    Nak,
    /// Work is ongoing; extend the ack-wait window by another period.
    InProgress,
    /// Stop redelivering this message without counting it as processed.
    Term,
}

impl From<AckKind> for Bytes {
    fn from(kind: AckKind) -> Self {
        use AckKind::*;
        match kind {
            Ack => Bytes::from_static(b"+ACK"),
            Nak => Bytes::from_static(b"-NAK"),
            InProgress => Bytes::from_static(b"+WPI"),
            Term => Bytes::from_static(b"+TERM"),
        }
    }
}
