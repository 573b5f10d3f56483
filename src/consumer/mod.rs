//! Consumer entities and the option model they are configured through.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::api::{
    self, AckPolicy, ConsumerConfig, ConsumerInfo, DeliverPolicy, NextRequest, ReplayPolicy,
    SequenceInfo,
};
use crate::error::{ConfigError, Error};
use crate::manager::Manager;
use crate::transport::{Transport, TransportMessage};

mod options;

pub use options::{build_config, ConsumerOption};

struct Cache {
    cfg: ConsumerConfig,
    last_info: Option<ConsumerInfo>,
}

/// A consumer attached to a stream.
///
/// The handle caches the configuration and state snapshot most recently
/// reported by the engine; the cache is guarded for shared use across
/// tasks, and the engine remains authoritative — [`state`](Consumer::state)
/// replaces it wholesale. Obtained from the [`Manager`] create/load
/// operations, never constructed directly.
pub struct Consumer<T: Transport> {
    name: String,
    stream: String,
    manager: Manager<T>,
    cache: Mutex<Cache>,
}

impl<T: Transport> std::fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("name", &self.name)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Consumer<T> {
    pub(crate) fn from_info(manager: Manager<T>, stream: &str, info: ConsumerInfo) -> Self {
        Consumer {
            name: info.name.clone(),
            stream: stream.to_string(),
            manager,
            cache: Mutex::new(Cache {
                cfg: info.config.clone(),
                last_info: Some(info),
            }),
        }
    }

    fn cfg<R>(&self, read: impl FnOnce(&ConsumerConfig) -> R) -> R {
        read(&self.cache.lock().unwrap().cfg)
    }

    /// Applies `opts` on top of the current configuration and re-creates
    /// the consumer under its durable name, then reloads the cache.
    ///
    /// Only durable consumers can be updated; re-issuing a create for an
    /// ephemeral consumer would produce an unrelated new one. The engine
    /// treats the re-create as an idempotent update keyed by the durable
    /// name; it is best effort, not an atomic swap.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn update_configuration(&self, opts: &[ConsumerOption]) -> Result<(), Error> {
        if !self.is_durable() {
            return Err(ConfigError::NotDurable.into());
        }

        let cfg = build_config(self.configuration(), opts)?;
        self.manager
            .new_consumer_from_template(&self.stream, cfg, &[])
            .await?;
        self.reset().await
    }

    /// Reloads the cached configuration and state from the engine.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn reset(&self) -> Result<(), Error> {
        let info = self.manager.consumer_info(&self.stream, &self.name).await?;
        let mut cache = self.cache.lock().unwrap();
        cache.cfg = info.config.clone();
        cache.last_info = Some(info);
        Ok(())
    }

    /// Fetches a fresh state snapshot, overwriting the cache.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn state(&self) -> Result<ConsumerInfo, Error> {
        let info = self.manager.consumer_info(&self.stream, &self.name).await?;
        self.cache.lock().unwrap().last_info = Some(info.clone());
        Ok(info)
    }

    /// The most recently fetched state, fetching only when none is cached.
    ///
    /// Lets frequent pollers avoid redundant round trips where
    /// [`state`](Consumer::state) guarantees freshness.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn latest_state(&self) -> Result<ConsumerInfo, Error> {
        {
            let cache = self.cache.lock().unwrap();
            if let Some(info) = &cache.last_info {
                return Ok(info.clone());
            }
        }
        self.state().await
    }

    /// Message sequences that were successfully delivered.
    pub async fn delivered_state(&self) -> Result<SequenceInfo, Error> {
        Ok(self.state().await?.delivered)
    }

    /// Highest contiguous sequences that were acknowledged.
    pub async fn acknowledged_floor(&self) -> Result<SequenceInfo, Error> {
        Ok(self.state().await?.ack_floor)
    }

    /// Number of messages delivered but not yet acknowledged.
    pub async fn pending_acknowledgement(&self) -> Result<i64, Error> {
        Ok(self.state().await?.num_ack_pending)
    }

    /// Number of messages in the stream not yet processed by this consumer.
    pub async fn pending_messages(&self) -> Result<u64, Error> {
        Ok(self.state().await?.num_pending)
    }

    /// Number of clients with outstanding pull requests.
    pub async fn waiting_client_pulls(&self) -> Result<i64, Error> {
        Ok(self.state().await?.num_waiting)
    }

    /// Number of redeliveries performed.
    pub async fn redelivery_count(&self) -> Result<i64, Error> {
        Ok(self.state().await?.num_redelivered)
    }

    /// Deletes the consumer, consuming the handle.
    ///
    /// Fails unless the engine replies with an explicit success flag.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn delete(self) -> Result<(), Error> {
        self.manager.delete_consumer(&self.stream, &self.name).await
    }

    /// Asks the consensus group backing this consumer to elect a new
    /// leader.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn leader_step_down(&self) -> Result<(), Error> {
        self.manager
            .consumer_leader_stepdown(&self.stream, &self.name)
            .await
    }

    /// Fetches the next message, waiting up to the manager timeout.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn next_msg(&self) -> Result<TransportMessage, Error> {
        self.manager.next_msg(&self.stream, &self.name).await
    }

    /// Fetches the next message, bounded only by the caller's token.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn next_msg_with_cancellation(
        &self,
        cancel: CancellationToken,
    ) -> Result<TransportMessage, Error> {
        self.manager
            .next_msg_with_cancellation(&self.stream, &self.name, cancel)
            .await
    }

    /// Requests a batch of messages to be delivered to `inbox`.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn next_msg_request(
        &self,
        inbox: &str,
        request: &NextRequest,
    ) -> Result<(), Error> {
        self.manager
            .next_msg_request(&self.stream, &self.name, inbox, request)
            .await
    }

    /// The subject this consumer is polled on, when it is a pull consumer.
    pub fn next_subject(&self) -> Option<String> {
        if !self.is_pull_mode() {
            return None;
        }
        self.manager.next_subject(&self.stream, &self.name).ok()
    }

    /// The subject acknowledgement samples are published to, when sampling
    /// is enabled.
    pub fn ack_sample_subject(&self) -> Option<String> {
        self.sample_frequency()?;
        Some(format!(
            "{}.{}.{}",
            api::METRIC_CONSUMER_ACK_PREFIX,
            self.stream,
            self.name
        ))
    }

    /// Wildcard subscription subject covering all advisories for this
    /// consumer.
    pub fn advisory_subject(&self) -> String {
        format!(
            "{}.CONSUMER.*.{}.{}",
            api::ADVISORY_PREFIX,
            self.stream,
            self.name
        )
    }

    /// Wildcard subscription subject covering all metrics for this
    /// consumer.
    pub fn metric_subject(&self) -> String {
        format!(
            "{}.CONSUMER.*.{}.{}",
            api::METRIC_PREFIX,
            self.stream,
            self.name
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    /// A copy of the cached configuration.
    pub fn configuration(&self) -> ConsumerConfig {
        self.cfg(|c| c.clone())
    }

    /// Pull consumers have no delivery subject and must be polled.
    pub fn is_pull_mode(&self) -> bool {
        self.cfg(|c| c.deliver_subject.is_none())
    }

    pub fn is_push_mode(&self) -> bool {
        !self.is_pull_mode()
    }

    pub fn is_durable(&self) -> bool {
        self.cfg(|c| c.durable.is_some())
    }

    pub fn is_ephemeral(&self) -> bool {
        !self.is_durable()
    }

    pub fn is_sampled(&self) -> bool {
        self.cfg(|c| c.sample_frequency.is_some())
    }

    pub fn is_headers_only(&self) -> bool {
        self.cfg(|c| c.headers_only)
    }

    pub fn description(&self) -> Option<String> {
        self.cfg(|c| c.description.clone())
    }

    pub fn durable_name(&self) -> Option<String> {
        self.cfg(|c| c.durable.clone())
    }

    pub fn delivery_subject(&self) -> Option<String> {
        self.cfg(|c| c.deliver_subject.clone())
    }

    pub fn deliver_policy(&self) -> DeliverPolicy {
        self.cfg(|c| c.deliver_policy)
    }

    pub fn start_sequence(&self) -> Option<u64> {
        self.cfg(|c| c.opt_start_seq)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.cfg(|c| c.opt_start_time)
    }

    pub fn ack_policy(&self) -> AckPolicy {
        self.cfg(|c| c.ack_policy)
    }

    pub fn ack_wait(&self) -> Duration {
        self.cfg(|c| c.ack_wait)
    }

    pub fn max_deliver(&self) -> i64 {
        self.cfg(|c| c.max_deliver)
    }

    pub fn backoff(&self) -> Vec<Duration> {
        self.cfg(|c| c.backoff.clone())
    }

    pub fn filter_subject(&self) -> Option<String> {
        self.cfg(|c| c.filter_subject.clone())
    }

    pub fn filter_subjects(&self) -> Vec<String> {
        self.cfg(|c| c.filter_subjects.clone())
    }

    pub fn replay_policy(&self) -> ReplayPolicy {
        self.cfg(|c| c.replay_policy)
    }

    pub fn sample_frequency(&self) -> Option<String> {
        self.cfg(|c| c.sample_frequency.clone())
    }

    pub fn rate_limit(&self) -> u64 {
        self.cfg(|c| c.rate_limit)
    }

    pub fn max_ack_pending(&self) -> i64 {
        self.cfg(|c| c.max_ack_pending)
    }

    pub fn flow_control(&self) -> bool {
        self.cfg(|c| c.flow_control)
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        self.cfg(|c| c.heartbeat)
    }

    pub fn deliver_group(&self) -> Option<String> {
        self.cfg(|c| c.deliver_group.clone())
    }

    pub fn max_waiting(&self) -> i64 {
        self.cfg(|c| c.max_waiting)
    }

    pub fn max_request_batch(&self) -> i64 {
        self.cfg(|c| c.max_request_batch)
    }

    pub fn max_request_expires(&self) -> Option<Duration> {
        self.cfg(|c| c.max_request_expires)
    }

    pub fn max_request_max_bytes(&self) -> i64 {
        self.cfg(|c| c.max_request_max_bytes)
    }

    pub fn inactive_threshold(&self) -> Option<Duration> {
        self.cfg(|c| c.inactive_threshold)
    }

    pub fn replicas(&self) -> i64 {
        self.cfg(|c| c.num_replicas)
    }

    pub fn memory_storage(&self) -> bool {
        self.cfg(|c| c.mem_storage)
    }

    pub fn metadata(&self) -> HashMap<String, String> {
        self.cfg(|c| c.metadata.clone())
    }
}
