//! In-process transport backed by registered responders.
//!
//! Useful for tests and for embedding the management layer against a local
//! engine shim: responders are registered per subject prefix, every request
//! and publish is captured for later inspection, and no network is involved.
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::{Transport, TransportError, TransportMessage};

type Responder = Box<dyn Fn(&TransportMessage) -> Result<Bytes, TransportError> + Send + Sync>;

/// In-memory [`Transport`] implementation.
#[derive(Default)]
pub struct MemoryTransport {
    responders: Mutex<Vec<(String, Responder)>>,
    requests: Mutex<Vec<TransportMessage>>,
    published: Mutex<Vec<TransportMessage>>,
    no_synchronous_requests: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the transport report that synchronous-style requests are not
    /// supported, as a publish-only transport would.
    pub fn without_synchronous_requests(mut self) -> Self {
        self.no_synchronous_requests = true;
        self
    }

    /// Registers a responder for every request whose subject starts with
    /// `prefix`. The longest matching prefix wins.
    pub fn respond_with<F>(&self, prefix: impl Into<String>, responder: F)
    where
        F: Fn(&TransportMessage) -> Result<Bytes, TransportError> + Send + Sync + 'static,
    {
        self.responders
            .lock()
            .unwrap()
            .push((prefix.into(), Box::new(responder)));
    }

    /// Every request issued so far, in order.
    pub fn requests(&self) -> Vec<TransportMessage> {
        self.requests.lock().unwrap().clone()
    }

    /// Every fire-and-forget publish issued so far, in order.
    pub fn published(&self) -> Vec<TransportMessage> {
        self.published.lock().unwrap().clone()
    }

    fn new_inbox() -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(22)
            .map(char::from)
            .collect();
        format!("_INBOX.{}", suffix)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        _timeout: Option<Duration>,
    ) -> Result<TransportMessage, TransportError> {
        let inbox = Self::new_inbox();
        let msg = TransportMessage {
            subject: subject.to_string(),
            reply: Some(inbox.clone()),
            payload,
        };
        self.requests.lock().unwrap().push(msg.clone());

        let responders = self.responders.lock().unwrap();
        let best = responders
            .iter()
            .filter(|(prefix, _)| subject.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());
        match best {
            Some((_, responder)) => responder(&msg).map(|payload| TransportMessage {
                subject: inbox,
                reply: None,
                payload,
            }),
            None => Err(TransportError::NoResponders),
        }
    }

    async fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        self.published.lock().unwrap().push(TransportMessage {
            subject: subject.to_string(),
            reply: reply.map(str::to_string),
            payload,
        });
        Ok(())
    }

    fn supports_synchronous_requests(&self) -> bool {
        !self.no_synchronous_requests
    }
}
