pub mod webhook;

pub use webhook::WebhookGateway;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Opaque reference to a channel the gateway can deliver to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef(pub String);

impl ChannelRef {
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a delivered message, returned by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef(pub String);

/// An interactive affordance attached to a message (e.g. snooze / disable
/// buttons on a reminder)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAction {
    pub id: String,
    pub label: String,
}

/// Payload handed to the gateway. The orchestrator never talks to a chat
/// API directly and never parses provider-specific formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<MessageAction>,
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.actions.push(MessageAction {
            id: id.into(),
            label: label.into(),
        });
        self
    }
}

/// The one abstraction the orchestrator calls to announce outcomes
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn notify(&self, target: &ChannelRef, payload: Message) -> Result<MessageRef>;
}

/// Recording gateway for tests and the default standalone deployment
#[derive(Default)]
pub struct MemoryGateway {
    sent: Mutex<Vec<(ChannelRef, Message)>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message delivered so far, in order
    pub fn sent(&self) -> Vec<(ChannelRef, Message)> {
        self.sent.lock().expect("gateway lock poisoned").clone()
    }

    /// Messages delivered to one target
    pub fn sent_to(&self, target: &str) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter(|(channel, _)| channel.0 == target)
            .map(|(_, message)| message)
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for MemoryGateway {
    async fn notify(&self, target: &ChannelRef, payload: Message) -> Result<MessageRef> {
        let mut sent = self.sent.lock().expect("gateway lock poisoned");
        sent.push((target.clone(), payload));
        Ok(MessageRef(format!("msg-{}", sent.len())))
    }
}
