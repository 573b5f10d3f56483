//! The composable option model consumer configurations are built from.
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::api::{AckPolicy, ConsumerConfig, DeliverPolicy, ReplayPolicy};
use crate::error::ConfigError;
use crate::util;

/// A single configuration transformation.
///
/// Options are applied in order over a template by [`build_config`]; later
/// options override earlier ones on the same field, and any option that
/// picks a delivery-start policy first clears previously set start
/// positions so at most one survives.
///
/// ```rust,ignore
/// let cfg = build_config(ConsumerConfig::default(), &[
///     ConsumerOption::DurableName("DISPATCH".to_string()),
///     ConsumerOption::FilterSubjects(vec!["orders.new".to_string()]),
///     ConsumerOption::MaxDeliveryAttempts(20),
/// ])?;
/// ```
#[derive(Clone, Debug)]
pub enum ConsumerOption {
    /// textual description providing additional context
    Description(String),
    /// subject a push consumer delivers its messages to
    DeliverySubject(String),
    /// explicit name for a named ephemeral consumer; durable consumers use
    /// [`DurableName`](ConsumerOption::DurableName) instead
    Name(String),
    /// durable name; when set it becomes the canonical consumer name
    DurableName(String),
    /// start consuming at a specific stream sequence
    StartAtSequence(u64),
    /// start consuming at a specific point in time
    StartAtTime(DateTime<Utc>),
    /// start consuming this far in the past
    StartAtTimeDelta(Duration),
    /// deliver every message available in the stream
    DeliverAllAvailable,
    /// start delivery at the last message in the stream
    StartWithLastReceived,
    /// start delivery at the next message to arrive
    StartWithNextReceived,
    /// deliver the last message for each filtered subject
    DeliverLastPerSubject,
    /// deliver headers only, no message bodies
    DeliverHeadersOnly,
    AcknowledgeNone,
    /// acknowledging a message acknowledges all preceding ones too
    AcknowledgeAll,
    /// every message must be acknowledged individually
    AcknowledgeExplicit,
    /// time a delivery may stay unacknowledged before redelivery
    AckWait(Duration),
    /// delivery attempts per message; exactly zero is rejected
    MaxDeliveryAttempts(i64),
    /// restrict the consumer to matching subjects; a single entry is stored
    /// in the scalar filter field
    FilterSubjects(Vec<String>),
    ReplayInstantly,
    /// replay at the rate messages originally arrived
    ReplayAsReceived,
    /// acknowledgement sampling percentage, zero disables sampling
    SamplePercent(i64),
    RateLimitBitsPerSecond(u64),
    /// outstanding pulls allowed against the consumer
    MaxWaiting(i64),
    /// unacknowledged deliveries allowed before delivery is suspended
    MaxAckPending(i64),
    /// idle interval after which a push consumer receives a heartbeat marker
    IdleHeartbeat(Duration),
    /// enable flow control for a push consumer
    PushFlowControl,
    /// share push delivery among subscribers of this group
    DeliverGroup(String),
    MaxRequestMaxBytes(i64),
    /// largest batch a pull request may ask for
    MaxRequestBatch(i64),
    /// longest pull expiry the engine will accept, at least 1ms
    MaxRequestExpires(Duration),
    /// idle time before an ephemeral consumer is removed
    InactiveThreshold(Duration),
    /// explicit redelivery delays; at least one interval is required
    BackoffIntervals(Vec<Duration>),
    /// redelivery delays growing linearly from `min` to `max` over `steps`
    LinearBackoff {
        steps: u32,
        min: Duration,
        max: Duration,
    },
    /// override the replica count inherited from the stream
    OverrideReplicas(i64),
    /// keep consumer state in memory rather than on disk
    OverrideMemoryStorage,
    /// attach string metadata; empty keys are rejected
    Metadata(HashMap<String, String>),
}

impl ConsumerOption {
    pub(crate) fn apply(&self, cfg: &mut ConsumerConfig) -> Result<(), ConfigError> {
        match self {
            ConsumerOption::Description(d) => cfg.description = Some(d.clone()),
            ConsumerOption::DeliverySubject(s) => cfg.deliver_subject = Some(s.clone()),
            ConsumerOption::Name(n) => {
                if !util::is_valid_name(n) {
                    return Err(ConfigError::InvalidConsumerName(n.clone()));
                }
                cfg.name = n.clone();
            }
            ConsumerOption::DurableName(n) => {
                if !util::is_valid_name(n) {
                    return Err(ConfigError::InvalidConsumerName(n.clone()));
                }
                cfg.durable = Some(n.clone());
            }
            ConsumerOption::StartAtSequence(seq) => {
                reset_deliver_policy(cfg);
                cfg.deliver_policy = DeliverPolicy::ByStartSequence;
                cfg.opt_start_seq = Some(*seq);
            }
            ConsumerOption::StartAtTime(t) => {
                reset_deliver_policy(cfg);
                cfg.deliver_policy = DeliverPolicy::ByStartTime;
                cfg.opt_start_time = Some(*t);
            }
            ConsumerOption::StartAtTimeDelta(delta) => {
                reset_deliver_policy(cfg);
                let nanos = i64::try_from(delta.as_nanos()).unwrap_or(i64::MAX);
                cfg.deliver_policy = DeliverPolicy::ByStartTime;
                cfg.opt_start_time = Some(Utc::now() - chrono::Duration::nanoseconds(nanos));
            }
            ConsumerOption::DeliverAllAvailable => {
                reset_deliver_policy(cfg);
                cfg.deliver_policy = DeliverPolicy::All;
            }
            ConsumerOption::StartWithLastReceived => {
                reset_deliver_policy(cfg);
                cfg.deliver_policy = DeliverPolicy::Last;
            }
            ConsumerOption::StartWithNextReceived => {
                reset_deliver_policy(cfg);
                cfg.deliver_policy = DeliverPolicy::New;
            }
            ConsumerOption::DeliverLastPerSubject => {
                reset_deliver_policy(cfg);
                cfg.deliver_policy = DeliverPolicy::LastPerSubject;
            }
            ConsumerOption::DeliverHeadersOnly => cfg.headers_only = true,
            ConsumerOption::AcknowledgeNone => cfg.ack_policy = AckPolicy::None,
            ConsumerOption::AcknowledgeAll => cfg.ack_policy = AckPolicy::All,
            ConsumerOption::AcknowledgeExplicit => cfg.ack_policy = AckPolicy::Explicit,
            ConsumerOption::AckWait(wait) => cfg.ack_wait = *wait,
            ConsumerOption::MaxDeliveryAttempts(n) => {
                if *n == 0 {
                    return Err(ConfigError::PreventsDelivery);
                }
                cfg.max_deliver = *n;
            }
            ConsumerOption::FilterSubjects(subjects) => {
                if subjects.len() == 1 {
                    cfg.filter_subject = Some(subjects[0].clone());
                } else {
                    cfg.filter_subjects.extend(subjects.iter().cloned());
                }
            }
            ConsumerOption::ReplayInstantly => cfg.replay_policy = ReplayPolicy::Instant,
            ConsumerOption::ReplayAsReceived => cfg.replay_policy = ReplayPolicy::Original,
            ConsumerOption::SamplePercent(percent) => {
                if !(0..=100).contains(percent) {
                    return Err(ConfigError::SamplePercentOutOfRange(*percent));
                }
                cfg.sample_frequency = if *percent == 0 {
                    None
                } else {
                    Some(format!("{}%", percent))
                };
            }
            ConsumerOption::RateLimitBitsPerSecond(bps) => cfg.rate_limit = *bps,
            ConsumerOption::MaxWaiting(pulls) => cfg.max_waiting = *pulls,
            ConsumerOption::MaxAckPending(pending) => cfg.max_ack_pending = *pending,
            ConsumerOption::IdleHeartbeat(interval) => cfg.heartbeat = Some(*interval),
            ConsumerOption::PushFlowControl => cfg.flow_control = true,
            ConsumerOption::DeliverGroup(group) => cfg.deliver_group = Some(group.clone()),
            ConsumerOption::MaxRequestMaxBytes(max) => cfg.max_request_max_bytes = *max,
            ConsumerOption::MaxRequestBatch(max) => cfg.max_request_batch = *max,
            ConsumerOption::MaxRequestExpires(max) => {
                if !max.is_zero() && *max < Duration::from_millis(1) {
                    return Err(ConfigError::RequestExpiresTooShort);
                }
                cfg.max_request_expires = Some(*max);
            }
            ConsumerOption::InactiveThreshold(threshold) => {
                cfg.inactive_threshold = Some(*threshold);
            }
            ConsumerOption::BackoffIntervals(intervals) => {
                if intervals.is_empty() {
                    return Err(ConfigError::EmptyBackoff);
                }
                cfg.backoff = intervals.clone();
            }
            ConsumerOption::LinearBackoff { steps, min, max } => {
                cfg.backoff = util::linear_backoff_periods(*steps, *min, *max)?;
            }
            ConsumerOption::OverrideReplicas(replicas) => cfg.num_replicas = *replicas,
            ConsumerOption::OverrideMemoryStorage => cfg.mem_storage = true,
            ConsumerOption::Metadata(metadata) => {
                if metadata.keys().any(|k| k.is_empty()) {
                    return Err(ConfigError::EmptyMetadataKey);
                }
                cfg.metadata = metadata.clone();
            }
        }
        Ok(())
    }
}

/// Builds a configuration by folding `opts` left to right over `template`.
///
/// The first failing option aborts the build; no partially applied
/// configuration escapes. Afterwards a durable name becomes the canonical
/// name, and a configuration that still has no name receives a generated
/// one.
#[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
pub fn build_config(
    template: ConsumerConfig,
    opts: &[ConsumerOption],
) -> Result<ConsumerConfig, ConfigError> {
    let mut cfg = template;
    for opt in opts {
        opt.apply(&mut cfg)?;
    }

    if let Some(durable) = &cfg.durable {
        cfg.name = durable.clone();
    }
    if cfg.name.is_empty() {
        cfg.name = util::generate_consumer_name();
    }

    Ok(cfg)
}

fn reset_deliver_policy(cfg: &mut ConsumerConfig) {
    cfg.deliver_policy = DeliverPolicy::All;
    cfg.opt_start_seq = None;
    cfg.opt_start_time = None;
}
