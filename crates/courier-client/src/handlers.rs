use async_trait::async_trait;
use courier_core::{Credentials, Message, MessageId};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::outbound;
use crate::relay::RelayTransport;

pub const TEST_MARKER: &str = "test";
pub const TEST_RESPONSE: &str = "test_response";

/// A relay message together with its decrypted payload.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message: Message,
    pub plaintext: Value,
}

impl InboundMessage {
    pub fn id(&self) -> &MessageId {
        &self.message.id
    }

    /// The plaintext's `type` field.
    pub fn marker(&self) -> Option<&str> {
        self.plaintext.get("type").and_then(Value::as_str)
    }
}

/// Per-message behaviour plugged into the delivery loop. Errors are logged
/// against the message id and never stop the loop.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, inbound: &InboundMessage, credentials: &Credentials)
        -> anyhow::Result<()>;
}

/// Surfaces plaintext to the operator and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleHandler;

#[async_trait]
impl MessageHandler for ConsoleHandler {
    async fn handle(
        &self,
        inbound: &InboundMessage,
        _credentials: &Credentials,
    ) -> anyhow::Result<()> {
        info!(
            message_id = %inbound.id(),
            created_at = inbound.message.created_at.as_deref().unwrap_or("unknown"),
            "received {}",
            inbound.plaintext
        );
        Ok(())
    }
}

/// Echoes like [`ConsoleHandler`], then answers `test` messages with a
/// `test_response` sent back through the relay.
pub struct AutoResponder {
    transport: Arc<dyn RelayTransport>,
}

impl AutoResponder {
    pub fn new(transport: Arc<dyn RelayTransport>) -> Self {
        Self { transport }
    }
}

pub fn reply_to(in_reply_to: &MessageId, timestamp: &str) -> Value {
    outbound::compose(
        TEST_RESPONSE,
        json!({
            "message": "work",
            "in_reply_to": in_reply_to,
        }),
        timestamp,
    )
}

#[async_trait]
impl MessageHandler for AutoResponder {
    async fn handle(
        &self,
        inbound: &InboundMessage,
        credentials: &Credentials,
    ) -> anyhow::Result<()> {
        ConsoleHandler.handle(inbound, credentials).await?;
        if inbound.marker() != Some(TEST_MARKER) {
            return Ok(());
        }
        let reply = reply_to(inbound.id(), &outbound::now_timestamp());
        outbound::send(self.transport.as_ref(), credentials, &reply).await?;
        info!(in_reply_to = %inbound.id(), "sent test response");
        Ok(())
    }
}
