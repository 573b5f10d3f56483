//! Wire-level types for the engine's JSON management API.
//!
//! Requests and responses are JSON objects exchanged over the transport.
//! Responses share an envelope carrying an optional structured error next to
//! the operation-specific fields; [`ApiError`] is that error.
use std::fmt;

use serde::{Deserialize, Serialize};

mod cluster;
mod consumer;

pub use self::cluster::{
    ClusterInfo, LeaderStepdownRequest, PeerInfo, PeerRemoveRequest, Placement,
};
pub use self::consumer::{
    AckPolicy, ConsumerConfig, ConsumerInfo, CreateConsumerRequest, DeliverPolicy, NextRequest,
    ReplayPolicy, SequenceInfo,
};

/// Default prefix under which the management API is mounted.
pub const DEFAULT_API_PREFIX: &str = "$CAS.API";

/// Prefix for advisory events emitted by the engine.
pub const ADVISORY_PREFIX: &str = "$CAS.EVENT.ADVISORY";

/// Prefix for metric events emitted by the engine.
pub const METRIC_PREFIX: &str = "$CAS.EVENT.METRIC";

/// Subject prefix acknowledgement samples are published to.
pub const METRIC_CONSUMER_ACK_PREFIX: &str = "$CAS.EVENT.METRIC.CONSUMER.ACK";

/// Subject (relative to the API prefix) requesting a meta-cluster leader
/// election.
pub const META_LEADER_STEPDOWN: &str = "META.LEADER.STEPDOWN";

/// Subject (relative to the API prefix) removing a peer from the
/// meta-cluster.
pub const SERVER_REMOVE: &str = "SERVER.REMOVE";

/// Error code the engine reports when a consumer does not exist.
pub const ERR_CONSUMER_NOT_FOUND: u16 = 10014;

pub fn consumer_create_subject(stream: &str, consumer: &str) -> String {
    format!("CONSUMER.CREATE.{}.{}", stream, consumer)
}

/// Extended create subject used when the configuration carries a single
/// filter subject.
pub fn consumer_create_with_filter_subject(stream: &str, consumer: &str, filter: &str) -> String {
    format!("CONSUMER.CREATE.{}.{}.{}", stream, consumer, filter)
}

pub fn consumer_info_subject(stream: &str, consumer: &str) -> String {
    format!("CONSUMER.INFO.{}.{}", stream, consumer)
}

pub fn consumer_delete_subject(stream: &str, consumer: &str) -> String {
    format!("CONSUMER.DELETE.{}.{}", stream, consumer)
}

pub fn consumer_leader_stepdown_subject(stream: &str, consumer: &str) -> String {
    format!("CONSUMER.LEADER.STEPDOWN.{}.{}", stream, consumer)
}

/// Subject pull consumers are polled on.
pub fn consumer_next_subject(stream: &str, consumer: &str) -> String {
    format!("CONSUMER.MSG.NEXT.{}.{}", stream, consumer)
}

/// Structured error returned inside a response envelope.
///
/// `code` is an HTTP-like status, `err_code` the stable engine-specific
/// error number callers should branch on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub err_code: u16,
    #[serde(default)]
    pub description: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "engine error {}: {}", self.err_code, self.description)
    }
}

impl std::error::Error for ApiError {}

/// Envelope every response is sniffed against before decoding the
/// operation-specific payload.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// Response shape for operations that only report success.
///
/// An absent flag decodes as `false`: a reply that carries neither an error
/// nor an explicit success is treated as a failure by callers.
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
}

pub(crate) fn is_false(v: &bool) -> bool {
    !*v
}

pub(crate) fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

pub(crate) fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

/// Serializes a `Duration` as integer nanoseconds, the engine's wire format
/// for all durations.
pub(crate) mod nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = i64::deserialize(d)?;
        if nanos < 0 {
            return Err(serde::de::Error::custom("duration must not be negative"));
        }
        Ok(Duration::from_nanos(nanos as u64))
    }
}

/// `Option<Duration>` variant of [`nanos`]; `None` is skipped on the wire.
pub(crate) mod opt_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => super::nanos::serialize(d, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let nanos = Option::<i64>::deserialize(d)?;
        match nanos {
            Some(n) if n < 0 => Err(serde::de::Error::custom("duration must not be negative")),
            Some(n) => Ok(Some(Duration::from_nanos(n as u64))),
            None => Ok(None),
        }
    }
}

/// `Vec<Duration>` variant of [`nanos`] for backoff interval lists.
pub(crate) mod nanos_vec {
    use std::time::Duration;

    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(v.len()))?;
        for d in v {
            seq.serialize_element(&i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        let nanos = Vec::<i64>::deserialize(d)?;
        nanos
            .into_iter()
            .map(|n| {
                if n < 0 {
                    Err(serde::de::Error::custom("duration must not be negative"))
                } else {
                    Ok(Duration::from_nanos(n as u64))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects() {
        assert_eq!(
            consumer_create_subject("ORDERS", "NEW"),
            "CONSUMER.CREATE.ORDERS.NEW"
        );
        assert_eq!(
            consumer_create_with_filter_subject("ORDERS", "NEW", "orders.new"),
            "CONSUMER.CREATE.ORDERS.NEW.orders.new"
        );
        assert_eq!(
            consumer_info_subject("ORDERS", "NEW"),
            "CONSUMER.INFO.ORDERS.NEW"
        );
        assert_eq!(
            consumer_delete_subject("ORDERS", "NEW"),
            "CONSUMER.DELETE.ORDERS.NEW"
        );
        assert_eq!(
            consumer_leader_stepdown_subject("ORDERS", "NEW"),
            "CONSUMER.LEADER.STEPDOWN.ORDERS.NEW"
        );
        assert_eq!(
            consumer_next_subject("ORDERS", "NEW"),
            "CONSUMER.MSG.NEXT.ORDERS.NEW"
        );
    }

    #[test]
    fn error_envelope_detection() {
        let envelope: ErrorEnvelope = serde_json::from_str(
            r#"{"type":"io.cascade.api.v1.consumer_info_response","error":{"code":404,"err_code":10014,"description":"consumer not found"}}"#,
        )
        .unwrap();
        let err = envelope.error.unwrap();
        assert_eq!(err.err_code, ERR_CONSUMER_NOT_FOUND);
        assert_eq!(err.description, "consumer not found");

        let clean: ErrorEnvelope = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(clean.error.is_none());
    }

    #[test]
    fn absent_success_flag_is_false() {
        let resp: SuccessResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(!resp.success);
        let resp: SuccessResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(resp.success);
    }
}
