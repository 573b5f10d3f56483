//! Consumer configuration and state as the engine sees them.
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::is_valid_name;

/// Where in the stream delivery starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverPolicy {
    /// deliver every message available in the stream
    All,
    /// deliver starting with the last message in the stream
    Last,
    /// deliver only messages received after the consumer was created
    New,
    /// deliver starting at a specific stream sequence
    ByStartSequence,
    /// deliver starting at a specific point in time
    ByStartTime,
    /// deliver the last message for each filtered subject
    LastPerSubject,
}

impl Default for DeliverPolicy {
    fn default() -> Self {
        DeliverPolicy::All
    }
}

/// How deliveries are acknowledged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// no acknowledgements are expected
    None,
    /// acknowledging a message also acknowledges all preceding ones
    All,
    /// every message must be acknowledged individually
    Explicit,
}

impl Default for AckPolicy {
    fn default() -> Self {
        AckPolicy::Explicit
    }
}

/// The pace historical messages are replayed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// as fast as the consumer can take them
    Instant,
    /// at the rate the messages originally arrived
    Original,
}

impl Default for ReplayPolicy {
    fn default() -> Self {
        ReplayPolicy::Instant
    }
}

/// Declarative description of consumption behavior.
///
/// Built from a template through [`ConsumerOption`][crate::ConsumerOption]
/// sequences rather than by hand; the engine echoes back the configuration
/// it actually applied, which may differ from the one submitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// consumer name; filled from the durable name or generated when absent
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// durable name; a consumer without one is ephemeral
    #[serde(
        rename = "durable_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub durable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub deliver_policy: DeliverPolicy,
    /// starting sequence, only meaningful with [`DeliverPolicy::ByStartSequence`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt_start_seq: Option<u64>,
    /// starting time, only meaningful with [`DeliverPolicy::ByStartTime`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ack_policy: AckPolicy,
    /// how long a delivery may stay unacknowledged before redelivery
    #[serde(default, with = "crate::api::nanos")]
    pub ack_wait: Duration,
    /// delivery attempts per message; negative means unlimited, zero is
    /// rejected because it would deliver nothing
    #[serde(default, skip_serializing_if = "crate::api::is_zero_i64")]
    pub max_deliver: i64,
    /// redelivery delays; overrides `ack_wait` pacing when set
    #[serde(
        default,
        with = "crate::api::nanos_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub backoff: Vec<Duration>,
    /// single filter subject, the normalized form when exactly one filter is
    /// given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_subject: Option<String>,
    /// multiple filter subjects, mutually exclusive with `filter_subject`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter_subjects: Vec<String>,
    #[serde(default)]
    pub replay_policy: ReplayPolicy,
    /// acknowledgement sampling percentage such as `"100%"`; disabled when
    /// absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_frequency: Option<String>,
    /// delivery rate limit in bits per second
    #[serde(
        rename = "rate_limit_bps",
        default,
        skip_serializing_if = "crate::api::is_zero_u64"
    )]
    pub rate_limit: u64,
    #[serde(default, skip_serializing_if = "crate::api::is_zero_i64")]
    pub max_ack_pending: i64,
    /// subject a push consumer streams messages to; a consumer without one
    /// is polled in pull mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliver_subject: Option<String>,
    /// delivery group for shared push delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliver_group: Option<String>,
    #[serde(default, skip_serializing_if = "crate::api::is_false")]
    pub flow_control: bool,
    /// idle heartbeat interval for push consumers
    #[serde(
        rename = "idle_heartbeat",
        default,
        with = "crate::api::opt_nanos",
        skip_serializing_if = "Option::is_none"
    )]
    pub heartbeat: Option<Duration>,
    /// outstanding pulls allowed against this consumer
    #[serde(default, skip_serializing_if = "crate::api::is_zero_i64")]
    pub max_waiting: i64,
    #[serde(default, skip_serializing_if = "crate::api::is_false")]
    pub headers_only: bool,
    #[serde(default, skip_serializing_if = "crate::api::is_zero_i64")]
    pub max_request_batch: i64,
    /// longest pull expiry the engine will accept; at least 1ms when set
    #[serde(
        default,
        with = "crate::api::opt_nanos",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_request_expires: Option<Duration>,
    #[serde(default, skip_serializing_if = "crate::api::is_zero_i64")]
    pub max_request_max_bytes: i64,
    /// idle time after which an ephemeral consumer is removed
    #[serde(
        default,
        with = "crate::api::opt_nanos",
        skip_serializing_if = "Option::is_none"
    )]
    pub inactive_threshold: Option<Duration>,
    /// replica count override, zero inherits the stream's
    #[serde(default, skip_serializing_if = "crate::api::is_zero_i64")]
    pub num_replicas: i64,
    #[serde(default, skip_serializing_if = "crate::api::is_false")]
    pub mem_storage: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Default for ConsumerConfig {
    /// The template new consumers start from: deliver everything, explicit
    /// acknowledgement with a 30 second window, instant replay.
    fn default() -> Self {
        ConsumerConfig {
            name: String::new(),
            durable: None,
            description: None,
            deliver_policy: DeliverPolicy::All,
            opt_start_seq: None,
            opt_start_time: None,
            ack_policy: AckPolicy::Explicit,
            ack_wait: Duration::from_secs(30),
            max_deliver: 0,
            backoff: Vec::new(),
            filter_subject: None,
            filter_subjects: Vec::new(),
            replay_policy: ReplayPolicy::Instant,
            sample_frequency: None,
            rate_limit: 0,
            max_ack_pending: 0,
            deliver_subject: None,
            deliver_group: None,
            flow_control: false,
            heartbeat: None,
            max_waiting: 0,
            headers_only: false,
            max_request_batch: 0,
            max_request_expires: None,
            max_request_max_bytes: 0,
            inactive_threshold: None,
            num_replicas: 0,
            mem_storage: false,
            metadata: HashMap::new(),
        }
    }
}

impl ConsumerConfig {
    /// The default template with 100% acknowledgement sampling enabled.
    pub fn sampled() -> Self {
        ConsumerConfig {
            sample_frequency: Some("100%".to_string()),
            ..ConsumerConfig::default()
        }
    }

    /// Checks the configuration for internal consistency.
    ///
    /// Pure and I/O-free; returns every violated rule rather than stopping
    /// at the first. An empty result means the configuration is valid. The
    /// manager gates every create and update on this.
    pub fn validate(&self) -> Vec<String> {
        let mut reasons = Vec::new();

        if self.name.is_empty() {
            reasons.push("consumer name is required".to_string());
        } else if !is_valid_name(&self.name) {
            reasons.push(format!("{:?} is not a valid consumer name", self.name));
        }

        if let Some(durable) = &self.durable {
            if !is_valid_name(durable) {
                reasons.push(format!("{:?} is not a valid durable name", durable));
            }
        }

        if let Some(freq) = &self.sample_frequency {
            match freq.trim_end_matches('%').parse::<i64>() {
                Ok(p) if (0..=100).contains(&p) => {}
                _ => reasons.push(format!(
                    "sample frequency {:?} is not a percentage between 0% and 100%",
                    freq
                )),
            }
        }

        if let Some(expires) = self.max_request_expires {
            if !expires.is_zero() && expires < Duration::from_millis(1) {
                reasons.push("max request expires must be at least 1ms".to_string());
            }
        }

        if self.filter_subject.is_some() && !self.filter_subjects.is_empty() {
            reasons
                .push("filter subject and filter subjects are mutually exclusive".to_string());
        }

        if self.deliver_subject.is_some() {
            if self.max_waiting != 0 {
                reasons.push("max waiting applies only to pull consumers".to_string());
            }
            if self.flow_control && self.heartbeat.is_none() {
                reasons.push("flow control requires an idle heartbeat".to_string());
            }
        } else {
            if self.deliver_group.is_some() {
                reasons.push("deliver group requires a push consumer".to_string());
            }
            if self.flow_control {
                reasons.push("flow control requires a push consumer".to_string());
            }
            if self.heartbeat.is_some() {
                reasons.push("idle heartbeat requires a push consumer".to_string());
            }
        }

        if !self.backoff.is_empty()
            && self.max_deliver > 0
            && self.max_deliver < self.backoff.len() as i64
        {
            reasons.push("max deliver must cover all backoff intervals".to_string());
        }

        if self.metadata.keys().any(|k| k.is_empty()) {
            reasons.push("invalid empty string key in metadata".to_string());
        }

        reasons
    }
}

/// Sequence positions as tracked by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceInfo {
    #[serde(default)]
    pub consumer_seq: u64,
    #[serde(default)]
    pub stream_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

/// Authoritative consumer state snapshot.
///
/// Replaces any locally cached state wholesale whenever it is fetched; the
/// embedded configuration is the one the engine actually applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumerInfo {
    #[serde(rename = "stream_name")]
    pub stream: String,
    pub name: String,
    pub created: DateTime<Utc>,
    pub config: ConsumerConfig,
    pub delivered: SequenceInfo,
    pub ack_floor: SequenceInfo,
    #[serde(default)]
    pub num_ack_pending: i64,
    #[serde(default)]
    pub num_redelivered: i64,
    #[serde(default)]
    pub num_waiting: i64,
    #[serde(default)]
    pub num_pending: u64,
    #[serde(default, skip_serializing_if = "crate::api::is_false")]
    pub push_bound: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<super::ClusterInfo>,
}

/// Request payload for consumer creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateConsumerRequest {
    #[serde(rename = "stream_name")]
    pub stream: String,
    pub config: ConsumerConfig,
}

/// Request payload for pulling the next batch of messages.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NextRequest {
    /// how long the engine may hold the pull open
    #[serde(
        default,
        with = "crate::api::nanos",
        skip_serializing_if = "is_zero_duration"
    )]
    pub expires: Duration,
    /// number of messages requested
    pub batch: i64,
    /// byte budget the batch must stay under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<i64>,
    /// answer immediately, with an empty-batch marker if nothing is pending
    #[serde(default, skip_serializing_if = "crate::api::is_false")]
    pub no_wait: bool,
    /// interval for heartbeat markers while the pull is held open
    #[serde(
        default,
        with = "crate::api::opt_nanos",
        skip_serializing_if = "Option::is_none"
    )]
    pub idle_heartbeat: Option<Duration>,
}

fn is_zero_duration(d: &Duration) -> bool {
    d.is_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn durable_pull_config(name: &str) -> ConsumerConfig {
        ConsumerConfig {
            name: name.to_string(),
            durable: Some(name.to_string()),
            max_deliver: -1,
            ..ConsumerConfig::default()
        }
    }

    #[test]
    fn default_template() {
        let cfg = ConsumerConfig::default();
        assert_eq!(cfg.deliver_policy, DeliverPolicy::All);
        assert_eq!(cfg.ack_policy, AckPolicy::Explicit);
        assert_eq!(cfg.ack_wait, Duration::from_secs(30));
        assert_eq!(cfg.replay_policy, ReplayPolicy::Instant);
        assert!(cfg.sample_frequency.is_none());

        let sampled = ConsumerConfig::sampled();
        assert_eq!(sampled.sample_frequency.as_deref(), Some("100%"));
        assert_eq!(sampled.ack_policy, AckPolicy::Explicit);
    }

    #[test]
    fn config_round_trip_preserves_fields() {
        let cfg = ConsumerConfig {
            description: Some("dispatcher".to_string()),
            deliver_policy: DeliverPolicy::ByStartSequence,
            opt_start_seq: Some(42),
            ack_wait: Duration::from_secs(10),
            backoff: vec![Duration::from_secs(1), Duration::from_secs(5)],
            filter_subject: Some("orders.new".to_string()),
            sample_frequency: Some("25%".to_string()),
            rate_limit: 8192,
            max_ack_pending: 100,
            max_request_expires: Some(Duration::from_secs(30)),
            inactive_threshold: Some(Duration::from_secs(300)),
            num_replicas: 3,
            metadata: [("team".to_string(), "payments".to_string())].into(),
            ..durable_pull_config("DISPATCH")
        };

        let encoded = serde_json::to_string(&cfg).unwrap();
        let decoded: ConsumerConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(cfg, decoded);
    }

    #[test]
    fn config_wire_names_match_the_engine() {
        let cfg = ConsumerConfig {
            rate_limit: 1024,
            heartbeat: Some(Duration::from_secs(5)),
            deliver_subject: Some("deliver.here".to_string()),
            ..durable_pull_config("DISPATCH")
        };
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(value["durable_name"], "DISPATCH");
        assert_eq!(value["rate_limit_bps"], 1024);
        assert_eq!(value["idle_heartbeat"], 5_000_000_000i64);
        assert_eq!(value["ack_wait"], 30_000_000_000i64);
        assert!(value.get("sample_frequency").is_none());
    }

    #[test]
    fn policies_use_snake_case_strings() {
        assert_eq!(
            serde_json::to_value(DeliverPolicy::ByStartSequence).unwrap(),
            "by_start_sequence"
        );
        assert_eq!(
            serde_json::to_value(DeliverPolicy::LastPerSubject).unwrap(),
            "last_per_subject"
        );
        assert_eq!(serde_json::to_value(AckPolicy::Explicit).unwrap(), "explicit");
        assert_eq!(serde_json::to_value(ReplayPolicy::Original).unwrap(), "original");
    }

    #[test]
    fn validate_accepts_a_sound_config() {
        assert!(durable_pull_config("DISPATCH").validate().is_empty());
    }

    #[test]
    fn validate_rejects_inconsistencies() {
        let cfg = ConsumerConfig {
            filter_subjects: vec!["orders.new".to_string(), "orders.paid".to_string()],
            filter_subject: Some("orders.new".to_string()),
            flow_control: true,
            deliver_group: Some("workers".to_string()),
            ..durable_pull_config("DISPATCH")
        };
        let reasons = cfg.validate();
        assert!(reasons.iter().any(|r| r.contains("mutually exclusive")));
        assert!(reasons.iter().any(|r| r.contains("flow control")));
        assert!(reasons.iter().any(|r| r.contains("deliver group")));
    }

    #[test]
    fn validate_checks_push_pull_field_exclusivity() {
        let push = ConsumerConfig {
            deliver_subject: Some("deliver.here".to_string()),
            max_waiting: 10,
            flow_control: true,
            ..durable_pull_config("DISPATCH")
        };
        let reasons = push.validate();
        assert!(reasons.iter().any(|r| r.contains("max waiting")));
        assert!(reasons.iter().any(|r| r.contains("idle heartbeat")));

        let heartbeat_pull = ConsumerConfig {
            heartbeat: Some(Duration::from_secs(5)),
            ..durable_pull_config("DISPATCH")
        };
        assert!(heartbeat_pull
            .validate()
            .iter()
            .any(|r| r.contains("push consumer")));
    }

    #[test]
    fn validate_checks_backoff_coverage() {
        let cfg = ConsumerConfig {
            max_deliver: 2,
            backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
            ],
            ..durable_pull_config("DISPATCH")
        };
        assert!(cfg.validate().iter().any(|r| r.contains("backoff")));
    }

    #[test]
    fn validate_checks_sample_frequency_and_expires() {
        let cfg = ConsumerConfig {
            sample_frequency: Some("142%".to_string()),
            max_request_expires: Some(Duration::from_micros(10)),
            ..durable_pull_config("DISPATCH")
        };
        let reasons = cfg.validate();
        assert!(reasons.iter().any(|r| r.contains("sample frequency")));
        assert!(reasons.iter().any(|r| r.contains("1ms")));
    }

    #[test]
    fn next_request_wire_shape() {
        let req = NextRequest {
            expires: Duration::from_secs(5),
            batch: 20,
            max_bytes: Some(1 << 20),
            no_wait: true,
            ..NextRequest::default()
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["expires"], 5_000_000_000i64);
        assert_eq!(value["batch"], 20);
        assert_eq!(value["max_bytes"], 1_048_576);
        assert_eq!(value["no_wait"], true);
        assert!(value.get("idle_heartbeat").is_none());

        let minimal = NextRequest {
            batch: 1,
            ..NextRequest::default()
        };
        let value = serde_json::to_value(&minimal).unwrap();
        assert!(value.get("expires").is_none());
        assert!(value.get("no_wait").is_none());
    }

    #[test]
    fn consumer_info_decodes_engine_response() {
        let raw = r#"{
            "type": "io.cascade.api.v1.consumer_info_response",
            "stream_name": "ORDERS",
            "name": "DISPATCH",
            "created": "2026-01-12T08:30:00Z",
            "config": {"name": "DISPATCH", "durable_name": "DISPATCH", "deliver_policy": "all",
                       "ack_policy": "explicit", "ack_wait": 30000000000, "replay_policy": "instant",
                       "max_deliver": -1},
            "delivered": {"consumer_seq": 10, "stream_seq": 12},
            "ack_floor": {"consumer_seq": 8, "stream_seq": 10},
            "num_ack_pending": 2,
            "num_redelivered": 1,
            "num_waiting": 0,
            "num_pending": 55
        }"#;
        let info: ConsumerInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.stream, "ORDERS");
        assert_eq!(info.delivered.consumer_seq, 10);
        assert_eq!(info.ack_floor.stream_seq, 10);
        assert_eq!(info.num_pending, 55);
        assert_eq!(info.config.ack_wait, Duration::from_secs(30));
        assert!(info.cluster.is_none());
    }
}
