//! Stanza transport collaborator boundary.
//!
//! The physical wire protocol lives outside this crate; the middleware only
//! needs topic provisioning, topic publication, subscription management and
//! addressed sends. Delivery is assumed reliable, ordered and at-least-once.

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::Message;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("transport failure: {0}")]
    Send(String),
}

/// Delivery policy configured on every provisioned topic: the transport
/// layer itself keeps no payloads, delivers regardless of presence, and
/// sends no notification events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicPolicy {
    pub persist_items: bool,
    pub presence_delivery: bool,
    pub notifications: bool,
}

/// Outbound operations against the stanza network.
pub trait Transport: Send + Sync {
    /// Idempotent topic creation for a channel.
    fn create_topic(&self, chid: &str) -> Result<(), TransportError>;

    fn configure_topic(&self, chid: &str, policy: &TopicPolicy) -> Result<(), TransportError>;

    /// Deliver a finalized message to the channel's subscribers.
    fn publish_to_topic(&self, chid: &str, message: &Message) -> Result<(), TransportError>;

    fn subscribe(&self, chid: &str, principal: &str) -> Result<(), TransportError>;

    fn unsubscribe(&self, chid: &str, principal: &str) -> Result<(), TransportError>;

    /// Addressed send used by the handler-side request primitive.
    fn send(&self, to: &str, corrid: &str, payload: &Value) -> Result<(), TransportError>;
}

/// Transport that accepts and drops everything; the default for runtimes
/// without a wired gateway.
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn create_topic(&self, _chid: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn configure_topic(&self, _chid: &str, _policy: &TopicPolicy) -> Result<(), TransportError> {
        Ok(())
    }

    fn publish_to_topic(&self, _chid: &str, _message: &Message) -> Result<(), TransportError> {
        Ok(())
    }

    fn subscribe(&self, _chid: &str, _principal: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn unsubscribe(&self, _chid: &str, _principal: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn send(&self, _to: &str, _corrid: &str, _payload: &Value) -> Result<(), TransportError> {
        Ok(())
    }
}

/// One captured outbound operation.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    CreateTopic { chid: String },
    ConfigureTopic { chid: String, policy: TopicPolicy },
    Publish { chid: String, msgid: Option<String> },
    Subscribe { chid: String, principal: String },
    Unsubscribe { chid: String, principal: String },
    Send { to: String, corrid: String },
}

/// Transport double recording every call, for asserting side effects.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    fail_publishes: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn fail_publishes(&self, fail: bool) {
        *self.fail_publishes.lock() = fail;
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }
}

impl Transport for RecordingTransport {
    fn create_topic(&self, chid: &str) -> Result<(), TransportError> {
        self.record(TransportCall::CreateTopic {
            chid: chid.to_string(),
        });
        Ok(())
    }

    fn configure_topic(&self, chid: &str, policy: &TopicPolicy) -> Result<(), TransportError> {
        self.record(TransportCall::ConfigureTopic {
            chid: chid.to_string(),
            policy: policy.clone(),
        });
        Ok(())
    }

    fn publish_to_topic(&self, chid: &str, message: &Message) -> Result<(), TransportError> {
        if *self.fail_publishes.lock() {
            return Err(TransportError::Send("publish rejected".to_string()));
        }
        self.record(TransportCall::Publish {
            chid: chid.to_string(),
            msgid: message.msgid.clone(),
        });
        Ok(())
    }

    fn subscribe(&self, chid: &str, principal: &str) -> Result<(), TransportError> {
        self.record(TransportCall::Subscribe {
            chid: chid.to_string(),
            principal: principal.to_string(),
        });
        Ok(())
    }

    fn unsubscribe(&self, chid: &str, principal: &str) -> Result<(), TransportError> {
        self.record(TransportCall::Unsubscribe {
            chid: chid.to_string(),
            principal: principal.to_string(),
        });
        Ok(())
    }

    fn send(&self, to: &str, corrid: &str, _payload: &Value) -> Result<(), TransportError> {
        self.record(TransportCall::Send {
            to: to.to_string(),
            corrid: corrid.to_string(),
        });
        Ok(())
    }
}
