//! Consumer configuration: the cursor and delivery policy a subscription
//! attaches to or creates on a stream.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use time::OffsetDateTime;

use super::error::Error;
use super::response::deserialize_time_opt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DeliverPolicy {
    All = 0,
    Last = 1,
    New = 2,
    ByStartSequence = 3,
    ByStartTime = 4,
    LastPerSubject = 5,
}

impl Default for DeliverPolicy {
    fn default() -> Self {
        DeliverPolicy::All
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum AckPolicy {
    None = 0,
    All = 1,
    Explicit = 2,
}

impl Default for AckPolicy {
    fn default() -> Self {
        AckPolicy::Explicit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ReplayPolicy {
    Instant = 0,
    Original = 1,
}

impl Default for ReplayPolicy {
    fn default() -> Self {
        ReplayPolicy::Instant
    }
}

/// A consumer's persistent configuration. An absent `durable_name` makes the
/// consumer ephemeral: the server removes it once its last subscription
/// goes away.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliver_subject: Option<String>,
    #[serde(default)]
    pub deliver_policy: DeliverPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opt_start_seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub opt_start_time: Option<OffsetDateTime>,
    #[serde(default)]
    pub ack_policy: AckPolicy,
    #[serde(default, with = "serde_nanos")]
    pub ack_wait: std::time::Duration,
    #[serde(default)]
    pub max_deliver: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_subject: Option<String>,
    #[serde(default)]
    pub replay_policy: ReplayPolicy,
    #[serde(default)]
    pub max_ack_pending: i64,
    /// Only meaningful for push consumers: route deliveries to subscribers
    /// sharing this queue group instead of fanning out to all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliver_group: Option<String>,
}

impl ConsumerConfig {
    pub fn builder() -> ConsumerConfigBuilder {
        ConsumerConfigBuilder::default()
    }

    pub fn is_durable(&self) -> bool {
        self.durable_name.is_some()
    }

    pub fn is_pull(&self) -> bool {
        self.deliver_subject.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsumerConfigBuilder {
    config: ConsumerConfig,
}

impl ConsumerConfigBuilder {
    pub fn durable_name(mut self, name: impl Into<String>) -> Self {
        self.config.durable_name = Some(name.into());
        self
    }

    pub fn deliver_subject(mut self, subject: impl Into<String>) -> Self {
        self.config.deliver_subject = Some(subject.into());
        self
    }

    pub fn deliver_policy(mut self, policy: DeliverPolicy) -> Self {
        self.config.deliver_policy = policy;
        self
    }

    pub fn opt_start_seq(mut self, seq: u64) -> Self {
        self.config.opt_start_seq = Some(seq);
        self
    }

    pub fn opt_start_time(mut self, time: OffsetDateTime) -> Self {
        self.config.opt_start_time = Some(time);
        self
    }

    pub fn ack_policy(mut self, policy: AckPolicy) -> Self {
        self.config.ack_policy = policy;
        self
    }

    pub fn ack_wait(mut self, wait: std::time::Duration) -> Self {
        self.config.ack_wait = wait;
        self
    }

    pub fn max_deliver(mut self, max: i64) -> Self {
        self.config.max_deliver = max;
        self
    }

    pub fn filter_subject(mut self, subject: impl Into<String>) -> Self {
        self.config.filter_subject = Some(subject.into());
        self
    }

    pub fn replay_policy(mut self, policy: ReplayPolicy) -> Self {
        self.config.replay_policy = policy;
        self
    }

    pub fn max_ack_pending(mut self, max: i64) -> Self {
        self.config.max_ack_pending = max;
        self
    }

    pub fn deliver_group(mut self, group: impl Into<String>) -> Self {
        self.config.deliver_group = Some(group.into());
        self
    }

    pub fn build(self) -> Result<ConsumerConfig, Error> {
        if let Some(durable) = &self.config.durable_name {
            if !crate::subject::is_valid_name(durable) {
                return Err(Error::InvalidArgument(format!(
                    "invalid durable name: {durable:?}"
                )));
            }
        }
        Ok(self.config)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SequenceInfo {
    pub consumer_seq: u64,
    pub stream_seq: u64,
}

/// The server-side view of a consumer: its configuration plus delivery
/// progress, as returned by `CONSUMER.CREATE` and `CONSUMER.INFO`.
#[derive(Debug, Clone, Deserialize)]
pub struct Info {
    pub stream_name: String,
    pub name: String,
    #[serde(deserialize_with = "deserialize_time_opt")]
    pub created: Option<OffsetDateTime>,
    pub config: ConsumerConfig,
    #[serde(default)]
    pub delivered: SequenceInfo,
    #[serde(default)]
    pub ack_floor: SequenceInfo,
    #[serde(default)]
    pub num_ack_pending: usize,
    #[serde(default)]
    pub num_redelivered: usize,
    #[serde(default)]
    pub num_waiting: usize,
    #[serde(default)]
    pub num_pending: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_pull_explicit_ack() {
        let config = ConsumerConfig::builder().build().unwrap();
        assert!(config.is_pull());
        assert!(!config.is_durable());
        assert_eq!(config.ack_policy, AckPolicy::Explicit);
    }

    #[test]
    fn deliver_subject_makes_it_a_push_consumer() {
        let config = ConsumerConfig::builder()
            .deliver_subject("_INBOX.abc")
            .build()
            .unwrap();
        assert!(!config.is_pull());
    }

    #[test]
    fn builder_rejects_invalid_durable_name() {
        assert!(ConsumerConfig::builder().durable_name("has space").build().is_err());
    }

    #[test]
    fn durable_name_set_marks_consumer_durable() {
        let config = ConsumerConfig::builder().durable_name("processor").build().unwrap();
        assert!(config.is_durable());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ConsumerConfig::builder()
            .durable_name("processor")
            .filter_subject("orders.*")
            .ack_policy(AckPolicy::All)
            .ack_wait(std::time::Duration::from_secs(30))
            .max_deliver(5)
            .max_ack_pending(100)
            .deliver_group("workers")
            .build()
            .unwrap();
        let json = serde_json::to_vec(&config).unwrap();
        let parsed: ConsumerConfig = serde_json::from_slice(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn unknown_fields_are_ignored_on_parse() {
        let raw = br#"{"durable_name":"processor","ack_policy":2,"future_field":"surprise"}"#;
        let config: ConsumerConfig = serde_json::from_slice(raw).unwrap();
        assert_eq!(config.durable_name.as_deref(), Some("processor"));
    }
}
