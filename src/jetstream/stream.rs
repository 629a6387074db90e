//! Stream configuration and the management calls [`super::Context`] exposes
//! for creating, inspecting, and removing streams.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use time::OffsetDateTime;

use super::error::Error;
use super::response::deserialize_time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum RetentionPolicy {
    Limits = 0,
    Interest = 1,
    WorkQueue = 2,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::Limits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum StorageType {
    File = 0,
    Memory = 1,
}

impl Default for StorageType {
    fn default() -> Self {
        StorageType::File
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DiscardPolicy {
    Old = 0,
    New = 1,
}

impl Default for DiscardPolicy {
    fn default() -> Self {
        DiscardPolicy::Old
    }
}

/// A stream's persistent configuration, as sent to `STREAM.CREATE` and
/// `STREAM.UPDATE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub storage: StorageType,
    #[serde(default)]
    pub discard: DiscardPolicy,
    /// Maximum number of messages the stream retains; `-1` means unlimited.
    #[serde(default = "unlimited")]
    pub max_msgs: i64,
    /// Maximum total bytes retained; `-1` means unlimited.
    #[serde(default = "unlimited")]
    pub max_bytes: i64,
    /// Maximum age of a message, in nanoseconds; `0` means unlimited.
    #[serde(default, with = "serde_nanos")]
    pub max_age: std::time::Duration,
    #[serde(default)]
    pub num_replicas: usize,
    #[serde(default)]
    pub duplicate_window: std::time::Duration,
}

fn unlimited() -> i64 {
    -1
}

impl Config {
    pub fn builder(name: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder {
            name: name.into(),
            subjects: Vec::new(),
            retention: RetentionPolicy::default(),
            storage: StorageType::default(),
            discard: DiscardPolicy::default(),
            max_msgs: -1,
            max_bytes: -1,
            max_age: std::time::Duration::ZERO,
            num_replicas: 1,
            duplicate_window: std::time::Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    name: String,
    subjects: Vec<String>,
    retention: RetentionPolicy,
    storage: StorageType,
    discard: DiscardPolicy,
    max_msgs: i64,
    max_bytes: i64,
    max_age: std::time::Duration,
    num_replicas: usize,
    duplicate_window: std::time::Duration,
}

impl ConfigBuilder {
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subjects.push(subject.into());
        self
    }

    pub fn subjects(mut self, subjects: impl IntoIterator<Item = String>) -> Self {
        self.subjects.extend(subjects);
        self
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn storage(mut self, storage: StorageType) -> Self {
        self.storage = storage;
        self
    }

    pub fn discard(mut self, discard: DiscardPolicy) -> Self {
        self.discard = discard;
        self
    }

    pub fn max_msgs(mut self, max: i64) -> Self {
        self.max_msgs = max;
        self
    }

    pub fn max_bytes(mut self, max: i64) -> Self {
        self.max_bytes = max;
        self
    }

    pub fn max_age(mut self, max: std::time::Duration) -> Self {
        self.max_age = max;
        self
    }

    pub fn num_replicas(mut self, n: usize) -> Self {
        self.num_replicas = n;
        self
    }

    pub fn duplicate_window(mut self, window: std::time::Duration) -> Self {
        self.duplicate_window = window;
        self
    }

    pub fn build(self) -> Result<Config, Error> {
        if !crate::subject::is_valid_name(&self.name) {
            return Err(Error::InvalidArgument(format!(
                "invalid stream name: {:?}",
                self.name
            )));
        }
        for subject in &self.subjects {
            if !crate::subject::is_valid_subject(subject) {
                return Err(Error::InvalidArgument(format!(
                    "invalid stream subject: {subject:?}"
                )));
            }
        }
        Ok(Config {
            name: self.name,
            subjects: self.subjects,
            retention: self.retention,
            storage: self.storage,
            discard: self.discard,
            max_msgs: self.max_msgs,
            max_bytes: self.max_bytes,
            max_age: self.max_age,
            num_replicas: self.num_replicas,
            duplicate_window: self.duplicate_window,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct State {
    pub messages: u64,
    pub bytes: u64,
    pub first_seq: u64,
    pub last_seq: u64,
    pub consumer_count: usize,
}

/// The full server-side view of a stream: its configuration plus current
/// state, as returned by `STREAM.CREATE`, `STREAM.INFO`, and
/// `STREAM.UPDATE`.
#[derive(Debug, Clone, Deserialize)]
pub struct Info {
    pub config: Config,
    #[serde(deserialize_with = "deserialize_time")]
    pub created: OffsetDateTime,
    pub state: State,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_dotted_name() {
        assert!(Config::builder("orders.archive").build().is_err());
    }

    #[test]
    fn builder_rejects_whitespace_subject() {
        assert!(Config::builder("orders").subject("orders events").build().is_err());
    }

    #[test]
    fn builder_accepts_wildcard_subject() {
        let config = Config::builder("orders").subject("orders.*").build().unwrap();
        assert_eq!(config.subjects, vec!["orders.*".to_string()]);
        assert_eq!(config.max_msgs, -1);
        assert_eq!(config.num_replicas, 1);
    }

    #[test]
    fn info_deserializes_with_fallback_time() {
        let raw = br#"{
            "config": {"name": "orders", "subjects": ["orders.*"]},
            "created": "not a timestamp",
            "state": {"messages": 0, "bytes": 0, "first_seq": 0, "last_seq": 0, "consumer_count": 0}
        }"#;
        let info: Info = serde_json::from_slice(raw).unwrap();
        assert_eq!(info.created.unix_timestamp(), -62_135_596_800);
        assert_eq!(info.config.retention, RetentionPolicy::Limits);
    }
}
