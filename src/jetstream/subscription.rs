//! The subscription orchestrator: decides whether to attach to an existing
//! consumer or create one, resolves a delivery subject, and wires up either
//! a push subscription (optionally auto-acking, dispatcher-driven) or a
//! pull protocol handle.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use super::context::Context;
use super::error::Error;
use super::options::SubscribeOptions;
use super::{AckKind, Message};

/// How a [`Subscription`] actually receives messages: pushed to a subject
/// the server writes to directly, or pulled on demand from a pull
/// consumer. Pull-only operations are rejected at the type level by
/// matching on this before doing any work.
enum Delivery {
    Push(crate::Subscription),
    Pull,
}

/// Fallback for `max_ack_pending` when a consumer is created with none set,
/// standing in for "the local subscription's pending-message limit" since
/// this crate's subscriptions don't carry one.
const DEFAULT_MAX_ACK_PENDING: i64 = 20_000;

/// A live attachment to a stream consumer, either pre-existing (attached)
/// or freshly created for this subscription.
pub struct Subscription {
    context: Context,
    stream: String,
    consumer_name: String,
    created_by_us: bool,
    auto_ack: bool,
    delivery: Delivery,
    /// Messages already fetched off the wire but not yet handed to the
    /// caller. Populated by the priming pull `subscribe` issues for a
    /// fresh pull consumer, and drained before any further pull goes out.
    buffered: VecDeque<crate::Message>,
}

impl Context {
    /// Subscribes to `subject` under `options`.
    ///
    /// Implements the orchestrator in six steps:
    /// 1. normalize (`options.is_pull_mode()` / `options.should_attach()`);
    /// 2. reject pull mode with a dispatcher handler, and reject attaching
    ///    outside direct mode;
    /// 3. resolve the delivery subject and, for the create path, the target
    ///    stream (by looking `subject` up if one wasn't given);
    /// 4. open the local subscription before the consumer exists, so no
    ///    push delivery can race ahead of a ready receiver;
    /// 5. create or look up the consumer, tearing the local subscription
    ///    back down if creation fails;
    /// 6. prime a pull if `options.is_pull_mode()`.
    pub async fn subscribe(
        &self,
        subject: impl Into<String>,
        options: SubscribeOptions,
    ) -> Result<Subscription, Error> {
        let subject = subject.into();

        let direct = options.direct || self.options().direct_mode;
        if options.should_attach() && !direct {
            return Err(Error::InvalidState("direct mode is required to attach".into()));
        }

        let pull_batch_size = options.pull_batch_size;
        let mut sub = if options.should_attach() {
            self.subscribe_attach(subject, options).await?
        } else {
            self.subscribe_create(subject, options).await?
        };

        // Step 6: prime a pull consumer with one batch immediately, rather
        // than waiting for the caller's first explicit pull().
        if sub.is_pull_mode() {
            sub.prime(pull_batch_size).await?;
        }

        Ok(sub)
    }

    /// Subscribes with a push dispatcher: `handler` runs for every message
    /// delivered, auto-acking on successful return iff `options.auto_ack`.
    /// Rejects pull-mode options outright, since a pull consumer has
    /// nothing to push to a dispatcher.
    pub async fn subscribe_with_handler<F>(
        &self,
        subject: impl Into<String>,
        options: SubscribeOptions,
        mut handler: F,
    ) -> Result<DispatcherSubscription, Error>
    where
        F: FnMut(Message) + Send + 'static,
    {
        if options.is_pull_mode() {
            return Err(Error::InvalidState("pull mode not allowed with dispatcher".into()));
        }
        let auto_ack = options.auto_ack;
        let mut sub = self.subscribe(subject, options).await?;
        let task = tokio::spawn(async move {
            loop {
                match sub.next_raw().await {
                    Some(Ok(message)) => {
                        let context = sub.context.clone();
                        let wrapped = Message {
                            message: message.clone(),
                            context,
                        };
                        handler(wrapped.clone());
                        if auto_ack {
                            let _ = wrapped.ack_with(AckKind::Ack).await;
                        }
                    }
                    Some(Err(_)) | None => break,
                }
            }
        });
        Ok(DispatcherSubscription { task })
    }

    async fn subscribe_attach(&self, subject: String, options: SubscribeOptions) -> Result<Subscription, Error> {
        let stream = options
            .stream
            .clone()
            .ok_or_else(|| Error::InvalidArgument("attach requires a stream".into()))?;

        let (consumer_name, deliver_subject, filter_subject) = if let Some(consumer) = &options.consumer {
            let info = self.consumer_info(&stream, consumer).await?;
            (info.name, info.config.deliver_subject, info.config.filter_subject)
        } else {
            // push_direct: the caller supplied a deliver subject directly
            // without naming an existing consumer to look up.
            (
                options
                    .consumer_config
                    .durable_name
                    .clone()
                    .unwrap_or_else(|| self.client().new_inbox()),
                options.consumer_config.deliver_subject.clone(),
                options.consumer_config.filter_subject.clone(),
            )
        };

        if let Some(filter) = &filter_subject {
            if filter != &subject {
                return Err(Error::InvalidArgument(format!(
                    "consumer filter subject {filter:?} does not match subscribed subject {subject:?}"
                )));
            }
        }

        let resolved_deliver = match deliver_subject {
            Some(subject) => subject,
            None => self.client().new_inbox(),
        };
        let core = self
            .client()
            .subscribe(resolved_deliver)
            .await
            .map_err(Error::Transport)?;

        Ok(Subscription {
            context: self.clone(),
            stream,
            consumer_name,
            created_by_us: false,
            auto_ack: options.auto_ack,
            delivery: Delivery::Push(core),
            buffered: VecDeque::new(),
        })
    }

    async fn subscribe_create(&self, subject: String, options: SubscribeOptions) -> Result<Subscription, Error> {
        let stream = match options.stream.clone() {
            Some(stream) => stream,
            None => self.lookup_stream_by_subject(&subject).await?,
        };

        let mut config = options.consumer_config.clone();
        config.filter_subject = Some(subject);
        if config.max_ack_pending == 0 {
            // Defensive bound: an explicit-ack consumer with no configured
            // limit could otherwise pile up unacked deliveries without end.
            config.max_ack_pending = DEFAULT_MAX_ACK_PENDING;
        }
        // Step 3, create case: a fresh inbox becomes the deliver subject
        // unless the caller asked to pull batches explicitly.
        let wants_push = !options.is_pull_mode();

        let mut push_sub = None;
        if wants_push {
            // Subscribe before the consumer exists: a push consumer starts
            // delivering as soon as it's created, and a message must not
            // race ahead of the local SUB that will receive it.
            let inbox = self.client().new_inbox();
            config.deliver_subject = Some(inbox.clone());
            push_sub = Some(self.client().subscribe(inbox).await.map_err(Error::Transport)?);
        }

        let info = match self.add_consumer(&stream, config).await {
            Ok(info) => info,
            Err(e) => {
                if let Some(mut sub) = push_sub {
                    let _ = sub.unsubscribe().await;
                }
                return Err(e);
            }
        };

        let delivery = match push_sub {
            Some(core) => Delivery::Push(core),
            None => Delivery::Pull,
        };

        Ok(Subscription {
            context: self.clone(),
            stream,
            consumer_name: info.name,
            created_by_us: true,
            auto_ack: options.auto_ack,
            delivery,
            buffered: VecDeque::new(),
        })
    }
}

/// A push subscription driven by a background task rather than polled
/// directly.
pub struct DispatcherSubscription {
    task: tokio::task::JoinHandle<()>,
}

impl DispatcherSubscription {
    pub fn abort(&self) {
        self.task.abort();
    }
}

#[derive(Serialize)]
struct PullRequest {
    batch: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    no_wait: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires: Option<u64>,
}

impl Subscription {
    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    pub fn is_pull_mode(&self) -> bool {
        matches!(self.delivery, Delivery::Pull)
    }

    pub async fn get_consumer_info(&self) -> Result<super::consumer::Info, Error> {
        self.context.consumer_info(&self.stream, &self.consumer_name).await
    }

    /// Receives the next message, applying auto-ack if the subscription was
    /// configured for it. On a push subscription this waits for server
    /// delivery; on a pull subscription it only drains whatever the most
    /// recent [`Self::pull`] (or the priming pull `subscribe` issues)
    /// already buffered, returning `None` once that's exhausted — call
    /// [`Self::pull`] again for more.
    pub async fn next_message(&mut self) -> Option<Result<Message, Error>> {
        match self.next_raw().await {
            Some(Ok(message)) => Some(self.wrap(message).await),
            Some(Err(e)) => Some(Err(e)),
            None => None,
        }
    }

    async fn next_raw(&mut self) -> Option<Result<crate::Message, Error>> {
        if let Some(message) = self.buffered.pop_front() {
            return Some(Ok(message));
        }
        match &mut self.delivery {
            Delivery::Push(core) => core.next_message().await.map(Ok),
            Delivery::Pull => None,
        }
    }

    /// Pulls up to `batch` messages, waiting indefinitely for at least one.
    pub async fn pull(&mut self, batch: usize) -> Result<Vec<Message>, Error> {
        self.pull_request(batch, false, None).await
    }

    /// Pulls up to `batch` messages without waiting for any to become
    /// available; returns immediately, possibly with an empty result.
    pub async fn pull_no_wait(&mut self, batch: usize) -> Result<Vec<Message>, Error> {
        self.pull_request(batch, true, None).await
    }

    /// Pulls up to `batch` messages, giving up after `expires` if fewer
    /// arrive.
    pub async fn pull_expires_in(&mut self, batch: usize, expires: Duration) -> Result<Vec<Message>, Error> {
        self.pull_request(batch, false, Some(expires)).await
    }

    /// Issues the one-time priming pull `subscribe` sends for a fresh pull
    /// consumer. Unlike [`Self::pull`], this never blocks waiting for
    /// messages to arrive — it's best-effort, and anything it turns up sits
    /// unwrapped in `buffered` until the caller asks for it (so it's acked,
    /// if at all, exactly once).
    async fn prime(&mut self, batch: usize) -> Result<(), Error> {
        let raw = self.fetch_raw(batch, true, None).await?;
        self.buffered.extend(raw);
        Ok(())
    }

    async fn pull_request(
        &mut self,
        batch: usize,
        no_wait: bool,
        expires: Option<Duration>,
    ) -> Result<Vec<Message>, Error> {
        if !self.is_pull_mode() {
            return Err(Error::InvalidState("pull is only valid on a pull consumer".into()));
        }

        let mut raw: Vec<crate::Message> = self.buffered.drain(..batch.min(self.buffered.len())).collect();
        if raw.len() < batch {
            raw.extend(self.fetch_raw(batch - raw.len(), no_wait, expires).await?);
        }

        let mut wrapped = Vec::with_capacity(raw.len());
        for message in raw {
            wrapped.push(self.wrap(message).await?);
        }
        Ok(wrapped)
    }

    /// Sends a `CONSUMER.MSG.NEXT` request and collects up to `batch` raw
    /// replies, without wrapping or acking them.
    async fn fetch_raw(
        &self,
        batch: usize,
        no_wait: bool,
        expires: Option<Duration>,
    ) -> Result<Vec<crate::Message>, Error> {
        let subject = format!(
            "{}CONSUMER.MSG.NEXT.{}.{}",
            self.context.options().api_prefix,
            self.stream,
            self.consumer_name
        );
        let inbox = self.context.client().new_inbox();
        let mut reply_sub = self
            .context
            .client()
            .subscribe(inbox.clone())
            .await
            .map_err(Error::Transport)?;

        let body = serde_json::to_vec(&PullRequest {
            batch,
            no_wait,
            expires: expires.map(|d| d.as_nanos() as u64),
        })
        .expect("pull request always serializes");

        self.context
            .client()
            .publish_with_reply(subject, inbox, Bytes::from(body))
            .await
            .map_err(Error::Transport)?;
        self.context.client().lenient_flush_buffer().await;

        let per_message_timeout = expires.unwrap_or(self.context.options().request_timeout);
        let mut received = Vec::with_capacity(batch);
        while received.len() < batch {
            let next = reply_sub.next_message_timeout(per_message_timeout).await;
            match next {
                Some(message) if message.payload.is_empty() => break,
                Some(message) => received.push(message),
                None => break,
            }
        }

        let _ = reply_sub.unsubscribe().await;
        self.context.client().lenient_flush_buffer().await;
        Ok(received)
    }

    async fn wrap(&self, message: crate::Message) -> Result<Message, Error> {
        let wrapped = Message {
            message,
            context: self.context.clone(),
        };
        if self.auto_ack {
            wrapped.ack_with(AckKind::Ack).await?;
        }
        Ok(wrapped)
    }

    pub async fn nak(&self, message: &Message) -> Result<(), Error> {
        message.ack_with(AckKind::Nak).await
    }

    pub async fn in_progress(&self, message: &Message) -> Result<(), Error> {
        message.ack_with(AckKind::InProgress).await
    }

    pub async fn term(&self, message: &Message) -> Result<(), Error> {
        message.ack_with(AckKind::Term).await
    }

    /// Tears down the local subscription. Durable consumers survive on the
    /// server; ephemeral consumers created for this subscription are
    /// deleted explicitly rather than left for the server's inactivity
    /// threshold to reap.
    pub async fn unsubscribe(mut self) -> Result<(), Error> {
        if let Delivery::Push(core) = &mut self.delivery {
            core.unsubscribe().await.map_err(Error::Transport)?;
        }
        if self.created_by_us {
            self.context.delete_consumer(&self.stream, &self.consumer_name).await?;
        }
        Ok(())
    }
}
