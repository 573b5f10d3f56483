//! Abstract publish/subscribe capability the manager talks through.
//!
//! The engine protocol only needs two primitives: a synchronous-style
//! request/reply exchange and a fire-and-forget publish carrying an explicit
//! reply subject. Connection handling, reconnection and authentication are
//! the transport implementation's business, not this crate's.
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub mod memory;

/// A message as delivered by the transport.
///
/// Status markers (heartbeats, end-of-batch) and data messages share this
/// shape; distinguishing them is up to the caller inspecting the payload and
/// headers of its inbox traffic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportMessage {
    /// subject the message was delivered on
    pub subject: String,
    /// reply subject to respond on, when one was requested
    pub reply: Option<String>,
    /// raw payload bytes
    pub payload: Bytes,
}

/// Failures raised by the transport itself, as opposed to structured errors
/// returned by the engine.
#[derive(Debug)]
pub enum TransportError {
    /// nothing is listening on the requested subject
    NoResponders,
    /// no reply arrived within the allotted time
    TimedOut,
    /// the underlying connection is gone
    Closed,
    /// the caller cancelled the exchange
    Cancelled,
    /// any other transport-specific failure
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::NoResponders => write!(f, "no responders available for request"),
            TransportError::TimedOut => write!(f, "request timed out"),
            TransportError::Closed => write!(f, "transport is closed"),
            TransportError::Cancelled => write!(f, "request cancelled"),
            TransportError::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TransportError {}

/// Publish/subscribe messaging capability.
///
/// Subjects are hierarchical dot-separated strings. Implementations must
/// deliver `request` replies for exactly one request and surface "nobody is
/// listening" and timeouts as distinct [`TransportError`] variants so that
/// callers can tell an unreachable engine from a rejecting one.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issues a single request and waits for its reply.
    ///
    /// A `timeout` of `None` means the exchange is bounded only by the
    /// caller (used for cancellation-driven pulls).
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Option<Duration>,
    ) -> Result<TransportMessage, TransportError>;

    /// Publishes a message, optionally carrying a reply subject for
    /// responses to be sent to.
    async fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<(), TransportError>;

    /// Whether the transport supports synchronous-style requests.
    ///
    /// Pull retrieval needs them; transports that only support
    /// fire-and-forget publishing should return `false` so pulls fail with
    /// an actionable error instead of hanging.
    fn supports_synchronous_requests(&self) -> bool {
        true
    }
}
