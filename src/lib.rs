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
//! A minimal async NATS client core, built to carry [`jetstream`], the
//! durable, acknowledged, stream-backed messaging layer.
//!
//! The plain publish/subscribe surface here — [`Client`], [`Message`],
//! [`connection::Subscription`] — is the transport [`jetstream`] is layered
//! on top of. It purposefully does not attempt reconnection, clustering, or
//! TLS: those are left to a production transport. What's here is enough to
//! exercise the JetStream state machine end to end, including over a real
//! socket.
//!
//! # Examples
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), jetstream_core::Error> {
//! let client = jetstream_core::connect("localhost:4222").await?;
//! let jetstream = jetstream_core::jetstream::new(client).await?;
//!
//! jetstream.publish("subject".to_string(), "data".into()).await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod jetstream;
mod proto;
pub mod subject;

use bytes::Bytes;
use std::time::Duration;
use tokio::net::{TcpStream, ToSocketAddrs};

pub use connection::Subscription;
pub use proto::ServerInfo;

/// A boxed error type, matching the rest of the NATS Rust client family:
/// callers downcast when they need a specific variant, otherwise they just
/// propagate and display it.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Default time to wait for a server reply before giving up.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A message received from the server, either via a subscription or as a
/// request reply.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Bytes,
}

/// A connected NATS client. Cheap to clone; clones share one socket.
#[derive(Clone)]
pub struct Client {
    connection: connection::Connection,
}

impl Client {
    pub async fn publish(&self, subject: impl Into<String>, payload: Bytes) -> Result<(), Error> {
        self.connection.publish(subject, payload).await
    }

    pub async fn publish_with_reply(
        &self,
        subject: impl Into<String>,
        reply: impl Into<String>,
        payload: Bytes,
    ) -> Result<(), Error> {
        self.connection.publish_with_reply(subject, reply, payload).await
    }

    pub async fn subscribe(&self, subject: impl Into<String>) -> Result<Subscription, Error> {
        self.connection.subscribe(subject, None).await
    }

    pub async fn queue_subscribe(
        &self,
        subject: impl Into<String>,
        queue: impl Into<String>,
    ) -> Result<Subscription, Error> {
        self.connection.subscribe(subject, Some(queue.into())).await
    }

    /// Spawns a task that drives `handler` for every message delivered to
    /// `subject`, returning immediately. Used for JetStream push-mode
    /// dispatcher subscriptions.
    pub async fn subscribe_with_handler<F>(
        &self,
        subject: impl Into<String>,
        queue: Option<String>,
        mut handler: F,
    ) -> Result<DispatcherSubscription, Error>
    where
        F: FnMut(Message) + Send + 'static,
    {
        let mut sub = self.connection.subscribe(subject, queue).await?;
        let connection = self.connection.clone();
        let sid = sub.sid;
        let task = tokio::spawn(async move {
            while let Some(message) = sub.next_message().await {
                handler(message);
            }
        });
        Ok(DispatcherSubscription {
            sid,
            connection,
            task,
        })
    }

    pub async fn request(
        &self,
        subject: impl Into<String>,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Option<Message>, Error> {
        self.connection.request(subject, payload, timeout).await
    }

    pub fn new_inbox(&self) -> String {
        self.connection.new_inbox()
    }

    /// Switches this client to the pre-multiplexed request style: one fresh
    /// subscription per request instead of a shared reply inbox. JetStream's
    /// [`jetstream::context::Context`] constructor calls this because
    /// attach/pull replies may race across distinct inboxes.
    pub fn use_old_request_style(&self) {
        self.connection.use_old_request_style()
    }

    pub async fn flush(&self, timeout: Duration) -> Result<(), Error> {
        self.connection.flush(timeout).await
    }

    pub async fn lenient_flush_buffer(&self) {
        self.connection.lenient_flush_buffer().await
    }

    pub async fn server_info(&self) -> ServerInfo {
        self.connection.server_info().await
    }
}

/// A push subscription driven by a background task rather than polled
/// directly.
pub struct DispatcherSubscription {
    sid: u64,
    connection: connection::Connection,
    task: tokio::task::JoinHandle<()>,
}

impl DispatcherSubscription {
    pub async fn unsubscribe(self) -> Result<(), Error> {
        self.task.abort();
        self.connection.unsubscribe(self.sid).await
    }
}

/// Connects to a NATS server at `addr` (e.g. `"localhost:4222"`).
pub async fn connect(addr: impl ToSocketAddrs) -> Result<Client, Error> {
    let stream = TcpStream::connect(addr).await.map_err(|e| Box::new(e) as Error)?;
    let (connection, _reader_task) = connection::Connection::connect(stream).await?;
    Ok(Client { connection })
}

/// Connects over an already-established duplex stream (used by tests to
/// connect to an in-process mock broker without touching a real socket).
pub async fn connect_with<S>(stream: S) -> Result<Client, Error>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
{
    let (connection, _reader_task) = connection::Connection::connect(stream).await?;
    Ok(Client { connection })
}
