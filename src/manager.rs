//! The management API gateway.
//!
//! A [`Manager`] is a cheaply cloneable handle over a [`Transport`] through
//! which every remote operation funnels: consumer lifecycle, pull
//! retrieval and meta-cluster requests. It performs no retries and keeps no
//! background tasks; each call is a single bounded request/reply exchange.
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::{select, Either};
use futures::pin_mut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::api::{
    self, ConsumerConfig, ConsumerInfo, CreateConsumerRequest, ErrorEnvelope,
    LeaderStepdownRequest, NextRequest, PeerRemoveRequest, Placement, SuccessResponse,
};
use crate::consumer::{build_config, Consumer, ConsumerOption};
use crate::error::{ConfigError, Error};
use crate::transport::{Transport, TransportError, TransportMessage};
use crate::util::is_valid_name;

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle on the engine's management API.
pub struct Manager<T: Transport> {
    transport: Arc<T>,
    timeout: Duration,
    api_prefix: String,
    trace: bool,
}

impl<T: Transport> Clone for Manager<T> {
    fn clone(&self) -> Self {
        Manager {
            transport: Arc::clone(&self.transport),
            timeout: self.timeout,
            api_prefix: self.api_prefix.clone(),
            trace: self.trace,
        }
    }
}

impl<T: Transport> Manager<T> {
    pub fn new(transport: T) -> Self {
        Manager {
            transport: Arc::new(transport),
            timeout: DEFAULT_TIMEOUT,
            api_prefix: api::DEFAULT_API_PREFIX.to_string(),
            trace: false,
        }
    }

    /// sets the timeout bounding every request/reply exchange
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// mounts the API under a non-default subject prefix
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// logs outbound requests and their replies at debug level; purely
    /// observational
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The transport this manager issues requests over.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn api_subject(&self, subject: &str) -> String {
        format!("{}.{}", self.api_prefix, subject)
    }

    /// Sends one JSON request and decodes the reply.
    ///
    /// A structured error in the reply envelope becomes [`Error::Api`];
    /// failures to reach the engine at all surface as [`Error::Transport`].
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub(crate) async fn json_request<Req, Resp>(
        &self,
        subject: String,
        body: Option<&Req>,
    ) -> Result<Resp, Error>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = match body {
            Some(body) => serde_json::to_vec(body).map_err(|e| Error::Encoding(e.to_string()))?,
            None => Vec::new(),
        };
        if self.trace {
            debug!(">>> {}:\n{}", subject, String::from_utf8_lossy(&payload));
        }

        let reply = self.bounded_request(&subject, Bytes::from(payload)).await?;
        if self.trace {
            debug!("<<< {}:\n{}", subject, String::from_utf8_lossy(&reply.payload));
        }

        let envelope: ErrorEnvelope = serde_json::from_slice(&reply.payload)
            .map_err(|e| Error::Decoding(e.to_string()))?;
        if let Some(err) = envelope.error {
            return Err(Error::Api(err));
        }

        serde_json::from_slice(&reply.payload).map_err(|e| Error::Decoding(e.to_string()))
    }

    async fn bounded_request(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> Result<TransportMessage, Error> {
        let exchange = self
            .transport
            .request(subject, payload, Some(self.timeout));
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result.map_err(Error::Transport),
            Err(_) => Err(Error::Transport(TransportError::TimedOut)),
        }
    }

    /// Creates a consumer on `stream` from the default template modified by
    /// `opts`.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn new_consumer(
        &self,
        stream: &str,
        opts: &[ConsumerOption],
    ) -> Result<Consumer<T>, Error> {
        self.new_consumer_from_template(stream, ConsumerConfig::default(), opts)
            .await
    }

    /// Creates a consumer on `stream` from `template` modified by `opts`.
    ///
    /// The entity returned caches the configuration the engine echoed back,
    /// not the locally built one; the engine may have adjusted fields.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn new_consumer_from_template(
        &self,
        stream: &str,
        template: ConsumerConfig,
        opts: &[ConsumerOption],
    ) -> Result<Consumer<T>, Error> {
        if !is_valid_name(stream) {
            return Err(ConfigError::InvalidStreamName(stream.to_string()).into());
        }

        let mut cfg = build_config(template, opts)?;

        let reasons = cfg.validate();
        if !reasons.is_empty() {
            return Err(ConfigError::Validation(reasons).into());
        }

        // Compatibility shim for engines predating multi-filter support: a
        // single filter travels in the scalar field and the extended create
        // subject.
        if cfg.filter_subjects.len() == 1 {
            cfg.filter_subject = Some(cfg.filter_subjects.remove(0));
        }

        let info = self.create_consumer(stream, cfg).await?;
        Ok(Consumer::from_info(self.clone(), stream, info))
    }

    async fn create_consumer(
        &self,
        stream: &str,
        cfg: ConsumerConfig,
    ) -> Result<ConsumerInfo, Error> {
        if cfg.name.is_empty() {
            return Err(ConfigError::MissingName.into());
        }

        let subject = match &cfg.filter_subject {
            Some(filter) => self.api_subject(&api::consumer_create_with_filter_subject(
                stream, &cfg.name, filter,
            )),
            None => self.api_subject(&api::consumer_create_subject(stream, &cfg.name)),
        };
        let request = CreateConsumerRequest {
            stream: stream.to_string(),
            config: cfg,
        };

        self.json_request(subject, Some(&request)).await
    }

    /// Loads a known consumer by name.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn load_consumer(&self, stream: &str, name: &str) -> Result<Consumer<T>, Error> {
        if !is_valid_name(stream) {
            return Err(ConfigError::InvalidStreamName(stream.to_string()).into());
        }
        if !is_valid_name(name) {
            return Err(ConfigError::InvalidConsumerName(name.to_string()).into());
        }

        let info = self.consumer_info(stream, name).await?;
        Ok(Consumer::from_info(self.clone(), stream, info))
    }

    /// Loads `name` if the engine knows it, otherwise creates it from the
    /// default template modified by `opts`.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn load_or_new_consumer(
        &self,
        stream: &str,
        name: &str,
        opts: &[ConsumerOption],
    ) -> Result<Consumer<T>, Error> {
        self.load_or_new_consumer_from_template(stream, name, ConsumerConfig::default(), opts)
            .await
    }

    /// Loads `name` if the engine knows it, otherwise creates it from
    /// `template` modified by `opts`.
    ///
    /// Only the engine's "consumer not found" error falls through to the
    /// create; any other load failure propagates unchanged.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn load_or_new_consumer_from_template(
        &self,
        stream: &str,
        name: &str,
        template: ConsumerConfig,
        opts: &[ConsumerOption],
    ) -> Result<Consumer<T>, Error> {
        if !is_valid_name(stream) {
            return Err(ConfigError::InvalidStreamName(stream.to_string()).into());
        }
        if !is_valid_name(name) {
            return Err(ConfigError::InvalidConsumerName(name.to_string()).into());
        }

        match self.load_consumer(stream, name).await {
            Err(ref err) if err.is_api_error_code(api::ERR_CONSUMER_NOT_FOUND) => {
                self.new_consumer_from_template(stream, template, opts).await
            }
            other => other,
        }
    }

    pub(crate) async fn consumer_info(
        &self,
        stream: &str,
        name: &str,
    ) -> Result<ConsumerInfo, Error> {
        self.json_request::<(), ConsumerInfo>(
            self.api_subject(&api::consumer_info_subject(stream, name)),
            None,
        )
        .await
    }

    /// Deletes a consumer by name.
    ///
    /// Success is only signaled by the explicit flag in the reply; a reply
    /// without it fails even when no error was reported.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn delete_consumer(&self, stream: &str, name: &str) -> Result<(), Error> {
        let resp: SuccessResponse = self
            .json_request::<(), _>(
                self.api_subject(&api::consumer_delete_subject(stream, name)),
                None,
            )
            .await?;
        if resp.success {
            Ok(())
        } else {
            Err(Error::UnexpectedResponse(format!(
                "unknown response while removing consumer {}",
                name
            )))
        }
    }

    /// Asks the consensus group backing a consumer to elect a new leader.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn consumer_leader_stepdown(&self, stream: &str, name: &str) -> Result<(), Error> {
        let resp: SuccessResponse = self
            .json_request::<(), _>(
                self.api_subject(&api::consumer_leader_stepdown_subject(stream, name)),
                None,
            )
            .await?;
        if resp.success {
            Ok(())
        } else {
            Err(Error::UnexpectedResponse(
                "unknown error while requesting leader step down".to_string(),
            ))
        }
    }

    /// Asks the meta-cluster leader to step down, optionally constrained to
    /// a placement.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn meta_leader_stepdown(&self, placement: Option<Placement>) -> Result<(), Error> {
        let request = LeaderStepdownRequest { placement };
        let resp: SuccessResponse = self
            .json_request(self.api_subject(api::META_LEADER_STEPDOWN), Some(&request))
            .await?;
        if resp.success {
            Ok(())
        } else {
            Err(Error::UnexpectedResponse(
                "unknown error while requesting leader step down".to_string(),
            ))
        }
    }

    /// Removes a peer from the meta-cluster by server name, or by peer id
    /// which the engine prefers when both are given.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn meta_peer_remove(
        &self,
        server: impl Into<String>,
        peer_id: Option<String>,
    ) -> Result<(), Error> {
        let request = PeerRemoveRequest {
            server: server.into(),
            id: peer_id,
        };
        let resp: SuccessResponse = self
            .json_request(self.api_subject(api::SERVER_REMOVE), Some(&request))
            .await?;
        if resp.success {
            Ok(())
        } else {
            Err(Error::UnexpectedResponse(
                "unknown error while removing peer".to_string(),
            ))
        }
    }

    /// The fully prefixed subject pull consumers are polled on.
    pub fn next_subject(&self, stream: &str, consumer: &str) -> Result<String, Error> {
        if !is_valid_name(stream) {
            return Err(ConfigError::InvalidStreamName(stream.to_string()).into());
        }
        if !is_valid_name(consumer) {
            return Err(ConfigError::InvalidConsumerName(consumer.to_string()).into());
        }
        Ok(self.api_subject(&api::consumer_next_subject(stream, consumer)))
    }

    /// Fetches the next message from a pull consumer, waiting up to the
    /// manager timeout.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn next_msg(&self, stream: &str, consumer: &str) -> Result<TransportMessage, Error> {
        if !self.transport.supports_synchronous_requests() {
            return Err(Error::SyncRequestsUnsupported);
        }

        let subject = self.next_subject(stream, consumer)?;
        let request = NextRequest {
            expires: self.timeout,
            batch: 1,
            ..NextRequest::default()
        };
        let payload =
            serde_json::to_vec(&request).map_err(|e| Error::Encoding(e.to_string()))?;
        if self.trace {
            debug!(">>> {}:\n{}", subject, String::from_utf8_lossy(&payload));
        }

        self.bounded_request(&subject, Bytes::from(payload)).await
    }

    /// Fetches the next message from a pull consumer, waiting until the
    /// caller cancels.
    ///
    /// The exchange is not bounded by the manager timeout; `cancel` is the
    /// only bound. For repeated pulls prefer
    /// [`next_msg_request`](Manager::next_msg_request).
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn next_msg_with_cancellation(
        &self,
        stream: &str,
        consumer: &str,
        cancel: CancellationToken,
    ) -> Result<TransportMessage, Error> {
        if !self.transport.supports_synchronous_requests() {
            return Err(Error::SyncRequestsUnsupported);
        }

        let subject = self.next_subject(stream, consumer)?;
        let request = NextRequest {
            batch: 1,
            ..NextRequest::default()
        };
        let payload =
            serde_json::to_vec(&request).map_err(|e| Error::Encoding(e.to_string()))?;

        let exchange = self.transport.request(&subject, Bytes::from(payload), None);
        let cancelled = cancel.cancelled();
        pin_mut!(cancelled);
        let outcome = match select(exchange, cancelled).await {
            Either::Left((result, _)) => result.map_err(Error::Transport),
            Either::Right(_) => Err(Error::Transport(TransportError::Cancelled)),
        };
        outcome
    }

    /// Requests a batch of messages to be delivered to `inbox`.
    ///
    /// Data messages and status markers (heartbeats, end-of-batch) all
    /// arrive on the inbox; telling them apart is the caller's job.
    #[cfg_attr(feature = "telemetry", tracing::instrument(skip_all))]
    pub async fn next_msg_request(
        &self,
        stream: &str,
        consumer: &str,
        inbox: &str,
        request: &NextRequest,
    ) -> Result<(), Error> {
        let subject = self.next_subject(stream, consumer)?;
        let payload = serde_json::to_vec(request).map_err(|e| Error::Encoding(e.to_string()))?;
        if self.trace {
            debug!(">>> {}:\n{}", subject, String::from_utf8_lossy(&payload));
        }

        self.transport
            .publish(&subject, Some(inbox), Bytes::from(payload))
            .await
            .map_err(Error::Transport)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::api::{ApiError, SequenceInfo};
    use crate::transport::memory::MemoryTransport;

    fn info_for(stream: &str, cfg: &ConsumerConfig) -> ConsumerInfo {
        ConsumerInfo {
            stream: stream.to_string(),
            name: cfg.name.clone(),
            created: Utc::now(),
            config: cfg.clone(),
            delivered: SequenceInfo::default(),
            ack_floor: SequenceInfo::default(),
            num_ack_pending: 0,
            num_redelivered: 0,
            num_waiting: 0,
            num_pending: 0,
            push_bound: false,
            cluster: None,
        }
    }

    fn echo_create(transport: &MemoryTransport) {
        transport.respond_with("$CAS.API.CONSUMER.CREATE", |msg| {
            let req: CreateConsumerRequest = serde_json::from_slice(&msg.payload).unwrap();
            let info = info_for(&req.stream, &req.config);
            Ok(serde_json::to_vec(&info).unwrap().into())
        });
    }

    fn api_error(code: u16, err_code: u16, description: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "error": ApiError {
                code,
                err_code,
                description: description.to_string(),
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_addresses_by_name() {
        let _ = env_logger::builder().is_test(true).try_init();
        let transport = MemoryTransport::new();
        echo_create(&transport);
        let manager = Manager::new(transport).with_trace(true);

        let consumer = manager
            .new_consumer(
                "ORDERS",
                &[ConsumerOption::DurableName("DISPATCH".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(consumer.name(), "DISPATCH");

        // no filter subject, so the name-based create subject is used
        let requests = manager.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].subject, "$CAS.API.CONSUMER.CREATE.ORDERS.DISPATCH");
    }

    #[tokio::test]
    async fn create_with_single_filter_uses_extended_subject() {
        let transport = MemoryTransport::new();
        echo_create(&transport);
        let manager = Manager::new(transport);

        let consumer = manager
            .new_consumer(
                "ORDERS",
                &[
                    ConsumerOption::DurableName("DISPATCH".to_string()),
                    ConsumerOption::FilterSubjects(vec!["orders.new".to_string()]),
                ],
            )
            .await
            .unwrap();
        drop(consumer);

        let requests = manager.transport().requests();
        assert_eq!(
            requests[0].subject,
            "$CAS.API.CONSUMER.CREATE.ORDERS.DISPATCH.orders.new"
        );
        let sent: CreateConsumerRequest = serde_json::from_slice(&requests[0].payload).unwrap();
        assert_eq!(sent.config.filter_subject.as_deref(), Some("orders.new"));
        assert!(sent.config.filter_subjects.is_empty());
    }

    #[tokio::test]
    async fn create_caches_the_echoed_config() {
        let transport = MemoryTransport::new();
        transport.respond_with("$CAS.API.CONSUMER.CREATE", |msg| {
            let req: CreateConsumerRequest = serde_json::from_slice(&msg.payload).unwrap();
            let mut cfg = req.config;
            // the engine is authoritative and may adjust what was asked for
            cfg.ack_wait = Duration::from_secs(120);
            cfg.max_ack_pending = 512;
            let info = info_for(&req.stream, &cfg);
            Ok(serde_json::to_vec(&info).unwrap().into())
        });
        let manager = Manager::new(transport);

        let consumer = manager
            .new_consumer(
                "ORDERS",
                &[
                    ConsumerOption::DurableName("DISPATCH".to_string()),
                    ConsumerOption::AckWait(Duration::from_secs(30)),
                ],
            )
            .await
            .unwrap();

        assert_eq!(consumer.ack_wait(), Duration::from_secs(120));
        assert_eq!(consumer.max_ack_pending(), 512);
    }

    #[tokio::test]
    async fn invalid_stream_name_fails_before_any_request() {
        let transport = MemoryTransport::new();
        let manager = Manager::new(transport);

        let err = manager.new_consumer("bad stream", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidStreamName(_))
        ));
        assert!(manager.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn validation_failure_aggregates_reasons() {
        let transport = MemoryTransport::new();
        let manager = Manager::new(transport);

        let err = manager
            .new_consumer(
                "ORDERS",
                &[
                    ConsumerOption::PushFlowControl,
                    ConsumerOption::DeliverGroup("workers".to_string()),
                ],
            )
            .await
            .unwrap_err();
        match err {
            Error::Config(ConfigError::Validation(reasons)) => assert_eq!(reasons.len(), 2),
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert!(manager.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn load_or_create_falls_through_on_not_found_only() {
        let transport = MemoryTransport::new();
        transport.respond_with("$CAS.API.CONSUMER.INFO", |_| {
            Ok(api_error(404, 10014, "consumer not found").into())
        });
        echo_create(&transport);
        let manager = Manager::new(transport);

        let consumer = manager
            .load_or_new_consumer(
                "ORDERS",
                "DISPATCH",
                &[ConsumerOption::DurableName("DISPATCH".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(consumer.name(), "DISPATCH");

        // exactly one load attempt followed by exactly one create attempt
        let requests = manager.transport().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].subject, "$CAS.API.CONSUMER.INFO.ORDERS.DISPATCH");
        assert_eq!(requests[1].subject, "$CAS.API.CONSUMER.CREATE.ORDERS.DISPATCH");
    }

    #[tokio::test]
    async fn load_or_create_propagates_other_errors() {
        let transport = MemoryTransport::new();
        transport.respond_with("$CAS.API.CONSUMER.INFO", |_| {
            Ok(api_error(500, 10023, "insufficient resources").into())
        });
        echo_create(&transport);
        let manager = Manager::new(transport);

        let err = manager
            .load_or_new_consumer("ORDERS", "DISPATCH", &[])
            .await
            .unwrap_err();
        assert!(err.is_api_error_code(10023));
        assert_eq!(manager.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn transport_failures_are_distinguishable_from_api_errors() {
        let transport = MemoryTransport::new();
        let manager = Manager::new(transport);

        let err = manager
            .load_consumer("ORDERS", "DISPATCH")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::NoResponders)
        ));
        assert!(err.api_error().is_none());
    }

    #[tokio::test]
    async fn delete_requires_the_explicit_success_flag() {
        let transport = MemoryTransport::new();
        transport.respond_with("$CAS.API.CONSUMER.DELETE.ORDERS.GONE", |_| {
            Ok(Bytes::from_static(b"{\"success\":true}"))
        });
        transport.respond_with("$CAS.API.CONSUMER.DELETE.ORDERS.VAGUE", |_| {
            Ok(Bytes::from_static(b"{}"))
        });
        let manager = Manager::new(transport);

        manager.delete_consumer("ORDERS", "GONE").await.unwrap();
        let err = manager
            .delete_consumer("ORDERS", "VAGUE")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn meta_leader_stepdown_carries_placement() {
        let transport = MemoryTransport::new();
        transport.respond_with("$CAS.API.META.LEADER.STEPDOWN", |msg| {
            let req: LeaderStepdownRequest = serde_json::from_slice(&msg.payload).unwrap();
            assert_eq!(req.placement.as_ref().unwrap().cluster, "east");
            Ok(Bytes::from_static(b"{\"success\":true}"))
        });
        let manager = Manager::new(transport);

        manager
            .meta_leader_stepdown(Some(Placement {
                cluster: "east".to_string(),
                tags: Vec::new(),
            }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn meta_peer_remove_requires_success() {
        let transport = MemoryTransport::new();
        transport.respond_with("$CAS.API.SERVER.REMOVE", |msg| {
            let req: PeerRemoveRequest = serde_json::from_slice(&msg.payload).unwrap();
            assert_eq!(req.server, "n3");
            assert_eq!(req.id.as_deref(), Some("p9"));
            Ok(Bytes::from_static(b"{\"success\":false}"))
        });
        let manager = Manager::new(transport);

        let err = manager
            .meta_peer_remove("n3", Some("p9".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn next_msg_requests_a_batch_of_one() {
        let transport = MemoryTransport::new();
        transport.respond_with("$CAS.API.CONSUMER.MSG.NEXT", |_| {
            Ok(Bytes::from_static(b"order payload"))
        });
        let manager = Manager::new(transport).with_timeout(Duration::from_secs(2));

        let msg = manager.next_msg("ORDERS", "DISPATCH").await.unwrap();
        assert_eq!(msg.payload, Bytes::from_static(b"order payload"));

        let requests = manager.transport().requests();
        assert_eq!(
            requests[0].subject,
            "$CAS.API.CONSUMER.MSG.NEXT.ORDERS.DISPATCH"
        );
        let sent: NextRequest = serde_json::from_slice(&requests[0].payload).unwrap();
        assert_eq!(sent.batch, 1);
        assert_eq!(sent.expires, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn next_msg_needs_synchronous_requests() {
        let transport = MemoryTransport::new().without_synchronous_requests();
        let manager = Manager::new(transport);

        let err = manager.next_msg("ORDERS", "DISPATCH").await.unwrap_err();
        assert!(matches!(err, Error::SyncRequestsUnsupported));
        assert!(manager.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_an_open_pull() {
        struct PendingTransport;

        #[async_trait::async_trait]
        impl Transport for PendingTransport {
            async fn request(
                &self,
                _subject: &str,
                _payload: Bytes,
                _timeout: Option<Duration>,
            ) -> Result<TransportMessage, TransportError> {
                futures::future::pending().await
            }

            async fn publish(
                &self,
                _subject: &str,
                _reply: Option<&str>,
                _payload: Bytes,
            ) -> Result<(), TransportError> {
                Ok(())
            }
        }

        let manager = Manager::new(PendingTransport);
        let cancel = CancellationToken::new();
        let pull = manager.next_msg_with_cancellation("ORDERS", "DISPATCH", cancel.clone());
        cancel.cancel();

        let err = pull.await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Cancelled)));
    }

    #[tokio::test]
    async fn next_msg_request_publishes_to_the_inbox() {
        let transport = MemoryTransport::new();
        let manager = Manager::new(transport);

        manager
            .next_msg_request(
                "ORDERS",
                "DISPATCH",
                "_INBOX.pull.1",
                &NextRequest {
                    expires: Duration::from_secs(30),
                    batch: 50,
                    max_bytes: Some(1 << 16),
                    no_wait: true,
                    ..NextRequest::default()
                },
            )
            .await
            .unwrap();

        let published = manager.transport().published();
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].subject,
            "$CAS.API.CONSUMER.MSG.NEXT.ORDERS.DISPATCH"
        );
        assert_eq!(published[0].reply.as_deref(), Some("_INBOX.pull.1"));
        let sent: NextRequest = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(sent.batch, 50);
        assert!(sent.no_wait);
    }

    #[tokio::test]
    async fn custom_api_prefix_is_applied() {
        let transport = MemoryTransport::new();
        transport.respond_with("$CAS.LEAF.API.CONSUMER.INFO", |_| {
            Ok(api_error(404, 10014, "consumer not found").into())
        });
        let manager = Manager::new(transport).with_api_prefix("$CAS.LEAF.API");

        let err = manager
            .load_consumer("ORDERS", "DISPATCH")
            .await
            .unwrap_err();
        assert!(err.is_api_error_code(api::ERR_CONSUMER_NOT_FOUND));
    }
}
