//! Configuration builders for a [`super::Context`], for [`super::Context::publish_with_options`],
//! and for subscription creation.

use std::time::Duration;

use crate::DEFAULT_REQUEST_TIMEOUT;

use super::consumer::ConsumerConfig;
use super::error::Error;

/// The default API prefix JetStream requests are sent under, absent a
/// domain or a custom prefix.
pub const DEFAULT_API_PREFIX: &str = "$JS.API.";

/// Options controlling how a [`super::Context`] talks to the JetStream API:
/// which subject prefix to use, how long to wait for replies, and whether
/// pull consumers should use direct-get delivery.
#[derive(Debug, Clone)]
pub struct JetStreamOptions {
    pub api_prefix: String,
    pub request_timeout: Duration,
    pub direct_mode: bool,
}

impl Default for JetStreamOptions {
    fn default() -> Self {
        JetStreamOptions {
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            direct_mode: false,
        }
    }
}

impl JetStreamOptions {
    pub fn builder() -> JetStreamOptionsBuilder {
        JetStreamOptionsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct JetStreamOptionsBuilder {
    api_prefix: Option<String>,
    domain: Option<String>,
    request_timeout: Option<Duration>,
    direct_mode: bool,
}

impl JetStreamOptionsBuilder {
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = Some(prefix.into());
        self
    }

    /// Scopes requests to a leafnode-hub domain: `$JS.<domain>.API.`.
    /// Mutually exclusive with [`Self::api_prefix`]; whichever is set last
    /// wins.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn direct_mode(mut self, enabled: bool) -> Self {
        self.direct_mode = enabled;
        self
    }

    pub fn build(self) -> Result<JetStreamOptions, Error> {
        let api_prefix = match (self.api_prefix, self.domain) {
            (Some(prefix), _) => prefix,
            (None, Some(domain)) => format!("$JS.{domain}.API."),
            (None, None) => DEFAULT_API_PREFIX.to_string(),
        };
        if !crate::subject::is_valid_prefix(&api_prefix) {
            return Err(Error::InvalidArgument(format!(
                "invalid JetStream API prefix: {api_prefix:?}"
            )));
        }
        Ok(JetStreamOptions {
            api_prefix,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            direct_mode: self.direct_mode,
        })
    }
}

/// Options for an individual [`super::Context::publish_with_options`] call.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// If set, the server rejects the publish unless it lands on this
    /// exact stream (guards against a subject being claimed by the wrong
    /// stream after the publisher last checked).
    pub expected_stream: Option<String>,
    /// Overrides the context's default request timeout for this publish.
    pub timeout: Option<Duration>,
    /// A client-supplied id the server deduplicates on within the stream's
    /// duplicate window, set via the `Nats-Msg-Id` header.
    pub message_id: Option<String>,
}

/// Options describing how to attach to or create a consumer when
/// subscribing to a subject.
///
/// The presence of both `stream` and `consumer`, or a `deliver_subject` set
/// on `consumer_config`, marks the intent to attach to a pre-existing
/// consumer rather than create one — see
/// [`SubscribeOptions::should_attach`].
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub stream: Option<String>,
    pub consumer: Option<String>,
    pub consumer_config: ConsumerConfig,
    /// Automatically ack every delivered message as soon as the handler
    /// returns, rather than leaving acknowledgement to the caller.
    pub auto_ack: bool,
    /// Number of messages requested per pull batch; `0` means push mode.
    pub pull_batch_size: usize,
    /// Bypasses the consumer lookup/creation dance and fetches directly
    /// from the stream; required to attach to a pre-existing consumer (see
    /// [`SubscribeOptions::should_attach`]).
    pub direct: bool,
}

impl SubscribeOptions {
    pub fn builder() -> SubscribeOptionsBuilder {
        SubscribeOptionsBuilder::default()
    }

    pub fn is_pull_mode(&self) -> bool {
        self.pull_batch_size > 0
    }

    pub fn should_attach(&self) -> bool {
        (self.stream.is_some() && self.consumer.is_some()) || self.consumer_config.deliver_subject.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeOptionsBuilder {
    stream: Option<String>,
    consumer: Option<String>,
    consumer_config: ConsumerConfig,
    auto_ack: Option<bool>,
    pull_batch_size: usize,
    direct: bool,
}

impl SubscribeOptionsBuilder {
    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Marks intent to attach to the named pre-existing consumer on
    /// `stream`, rather than create a new one.
    pub fn attach(mut self, stream: impl Into<String>, consumer: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self.consumer = Some(consumer.into());
        self
    }

    /// Sets the stream to create a consumer on, along with the consumer's
    /// configuration.
    pub fn configuration(mut self, stream: impl Into<String>, config: ConsumerConfig) -> Self {
        self.stream = Some(stream.into());
        self.consumer_config = config;
        self
    }

    pub fn durable(mut self, name: impl Into<String>) -> Self {
        self.consumer_config.durable_name = Some(name.into());
        self
    }

    /// Creates a push consumer delivering to `subject` directly, bypassing
    /// the attach/create distinction.
    pub fn push_direct(mut self, subject: impl Into<String>) -> Self {
        self.consumer_config.deliver_subject = Some(subject.into());
        self.direct = true;
        self
    }

    pub fn auto_ack(mut self, enabled: bool) -> Self {
        self.auto_ack = Some(enabled);
        self
    }

    pub fn pull(mut self, batch_size: usize) -> Self {
        self.pull_batch_size = batch_size;
        self
    }

    pub fn direct(mut self, enabled: bool) -> Self {
        self.direct = enabled;
        self
    }

    pub fn build(self) -> Result<SubscribeOptions, Error> {
        if let Some(stream) = &self.stream {
            if !crate::subject::is_valid_name(stream) {
                return Err(Error::InvalidArgument(format!("invalid stream name: {stream:?}")));
            }
        }
        if let Some(durable) = &self.consumer_config.durable_name {
            if !crate::subject::is_valid_name(durable) {
                return Err(Error::InvalidArgument(format!(
                    "invalid durable name: {durable:?}"
                )));
            }
        }
        Ok(SubscribeOptions {
            stream: self.stream,
            consumer: self.consumer,
            consumer_config: self.consumer_config,
            // Matches the reference builder's default: auto-ack unless the
            // caller opts out, since Explicit ack policy is the common case
            // and forgetting to ack silently stalls redelivery.
            auto_ack: self.auto_ack.unwrap_or(true),
            pull_batch_size: self.pull_batch_size,
            direct: self.direct,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_api_prefix_is_used_absent_domain_or_prefix() {
        let options = JetStreamOptions::builder().build().unwrap();
        assert_eq!(options.api_prefix, DEFAULT_API_PREFIX);
    }

    #[test]
    fn domain_overrides_default_prefix() {
        let options = JetStreamOptions::builder().domain("hub").build().unwrap();
        assert_eq!(options.api_prefix, "$JS.hub.API.");
    }

    #[test]
    fn explicit_prefix_wins_over_domain() {
        let options = JetStreamOptions::builder()
            .domain("hub")
            .api_prefix("$JS.API.")
            .build()
            .unwrap();
        assert_eq!(options.api_prefix, "$JS.API.");
    }

    #[test]
    fn rejects_wildcard_prefix() {
        assert!(JetStreamOptions::builder().api_prefix("$JS.*.API.").build().is_err());
    }

    #[test]
    fn rejects_invalid_stream_name() {
        assert!(SubscribeOptions::builder().stream("orders.>").build().is_err());
    }

    #[test]
    fn rejects_invalid_durable_name() {
        assert!(SubscribeOptions::builder().durable("has space").build().is_err());
    }

    #[test]
    fn attach_sets_should_attach() {
        let options = SubscribeOptions::builder().attach("foo", "bar").build().unwrap();
        assert!(options.should_attach());
    }

    #[test]
    fn push_direct_sets_should_attach_via_deliver_subject() {
        let options = SubscribeOptions::builder()
            .configuration("foo", ConsumerConfig::default())
            .push_direct("_INBOX.x")
            .build()
            .unwrap();
        assert!(options.should_attach());
        assert!(options.direct);
    }

    #[test]
    fn create_without_attach_fields_should_not_attach() {
        let options = SubscribeOptions::builder()
            .configuration("foo", ConsumerConfig::default())
            .build()
            .unwrap();
        assert!(!options.should_attach());
    }

    #[test]
    fn builder_matches_full_surface() {
        let options = SubscribeOptions::builder()
            .attach("foo", "bar")
            .configuration("foo", ConsumerConfig::default())
            .push_direct("pushsubj")
            .auto_ack(false)
            .durable("durable")
            .pull(1234)
            .build()
            .unwrap();
        assert_eq!(options.stream.as_deref(), Some("foo"));
        assert_eq!(options.consumer.as_deref(), Some("bar"));
        assert_eq!(options.pull_batch_size, 1234);
        assert_eq!(options.consumer_config.durable_name.as_deref(), Some("durable"));
        assert!(!options.auto_ack);
    }

    #[test]
    fn auto_ack_defaults_true() {
        let options = SubscribeOptions::builder().configuration("foo", ConsumerConfig::default()).build().unwrap();
        assert!(options.auto_ack);
    }
}
