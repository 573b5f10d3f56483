//! Management and data-plane client for the Cascade stream engine.
//!
//! Cascade stores messages in durable, replicated streams; named consumers
//! attached to a stream track delivery, acknowledgement and redelivery
//! state. This crate declares, configures, introspects and polls those
//! consumers by exchanging JSON requests over a publish/subscribe
//! [`Transport`], and leaves connection handling to the transport
//! implementation.
//!
//! Consumers are built from a template through an ordered list of
//! [`ConsumerOption`]s, validated locally, and created on the engine; the
//! engine's echoed configuration is what the returned handle caches.
//!
//! ```rust,no_run
//! use cascade_client::{ConsumerOption, Manager};
//! use cascade_client::transport::memory::MemoryTransport;
//!
//! # async fn run() -> Result<(), cascade_client::Error> {
//! let manager = Manager::new(MemoryTransport::new());
//!
//! let consumer = manager
//!     .load_or_new_consumer(
//!         "ORDERS",
//!         "DISPATCH",
//!         &[
//!             ConsumerOption::DurableName("DISPATCH".to_string()),
//!             ConsumerOption::FilterSubjects(vec!["orders.new".to_string()]),
//!             ConsumerOption::MaxDeliveryAttempts(20),
//!         ],
//!     )
//!     .await?;
//!
//! let state = consumer.state().await?;
//! println!("{} messages pending", state.num_pending);
//!
//! let msg = consumer.next_msg().await?;
//! println!("got {} bytes", msg.payload.len());
//! # Ok(())
//! # }
//! ```
//!
//! No operation retries internally and none spawns background work; every
//! failure is returned to the caller, which keeps the engine's availability
//! visible instead of hidden behind opaque retry loops.
#[macro_use]
extern crate log;

pub use crate::api::{
    AckPolicy, ApiError, ClusterInfo, ConsumerConfig, ConsumerInfo, DeliverPolicy, NextRequest,
    PeerInfo, Placement, ReplayPolicy, SequenceInfo,
};
pub use crate::consumer::{build_config, Consumer, ConsumerOption};
pub use crate::error::{ConfigError, Error};
pub use crate::manager::{Manager, DEFAULT_TIMEOUT};
pub use crate::transport::{Transport, TransportError, TransportMessage};
pub use crate::util::{generate_consumer_name, is_valid_name, linear_backoff_periods};

pub mod api;
pub mod consumer;
mod error;
mod manager;
pub mod transport;
mod util;
