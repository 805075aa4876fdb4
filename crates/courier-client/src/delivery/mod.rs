//! Poll → decrypt → handle → ack, with backoff between iterations.
//!
//! A batch is handled in ascending id order, the cursor advances past every
//! message whether or not its handler succeeded, and exactly one ack carrying
//! the batch's highest id follows. If that ack fails it is retried before the
//! next poll, so the relay never sees a gap. A retry the relay refuses outright
//! is dropped and polling resumes from the local cursor.

pub mod backoff;
pub mod sleeper;

pub use backoff::Backoff;
pub use sleeper::{Sleeper, TokioSleeper};

use courier_core::crypto;
use courier_core::{CodecError, Credentials, Cursor, Message, MessageId, PersonalKey};
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::handlers::{InboundMessage, MessageHandler};
use crate::relay::{ErrorClass, RelayError, RelayTransport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Poll returned nothing new.
    Empty,
    Delivered {
        processed: usize,
        last_id: MessageId,
        acked: bool,
    },
    Failed(ErrorClass),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub outcome: StepOutcome,
    /// Sleep before the next step.
    pub delay: Duration,
}

pub struct DeliveryLoop {
    transport: Arc<dyn RelayTransport>,
    handler: Arc<dyn MessageHandler>,
    sleeper: Arc<dyn Sleeper>,
    credentials: Credentials,
    key: PersonalKey,
    cursor: Cursor,
    backoff: Backoff,
    unacked: Option<MessageId>,
}

impl DeliveryLoop {
    /// Fails with `InvalidKey` when the stored personal token is unusable.
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        handler: Arc<dyn MessageHandler>,
        credentials: Credentials,
    ) -> Result<Self, CodecError> {
        let key = credentials.personal_key()?;
        Ok(Self {
            transport,
            handler,
            sleeper: Arc::new(TokioSleeper),
            credentials,
            key,
            cursor: Cursor::start(),
            backoff: Backoff::new(),
            unacked: None,
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn starting_at(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Id whose ack failed and will be retried before the next poll.
    pub fn pending_ack(&self) -> Option<&MessageId> {
        self.unacked.as_ref()
    }

    /// One iteration. Never fails: every error is logged and folded into the
    /// returned outcome and delay.
    pub async fn step(&mut self) -> Step {
        if let Some(pending) = self.unacked.clone() {
            match self.transport.ack(&self.credentials, &pending).await {
                Ok(()) => {
                    info!(last_id = %pending, "pending ack delivered");
                    self.unacked = None;
                }
                Err(err) if err.class() == ErrorClass::Fatal => {
                    warn!(
                        last_id = %pending,
                        status = ?err.status(),
                        error = %err,
                        "relay refused pending ack; dropping it, the next batch ack covers it"
                    );
                    self.unacked = None;
                }
                Err(err) => return self.failed("ack", err),
            }
        }

        let mut batch = match self.transport.poll(&self.credentials, &self.cursor).await {
            Ok(batch) => batch,
            Err(err) => return self.failed("poll", err),
        };
        batch.sort_by(|a, b| a.id.cmp(&b.id));
        let polled = batch.len();
        batch.retain(|m| self.cursor.position().map_or(true, |c| m.id > *c));
        if batch.len() < polled {
            warn!(
                cursor = ?self.cursor.position(),
                stale = polled - batch.len(),
                "relay returned messages at or behind the cursor; skipping them"
            );
        }

        let Some(last_id) = batch.last().map(|m| m.id.clone()) else {
            let delay = self.backoff.on_idle();
            info!(next_poll_secs = delay.as_secs(), "no messages");
            return Step {
                outcome: StepOutcome::Empty,
                delay,
            };
        };

        for message in &batch {
            self.process(message).await;
            self.cursor.advance(&message.id);
        }

        let processed = batch.len();
        match self.transport.ack(&self.credentials, &last_id).await {
            Ok(()) => {
                debug!(last_id = %last_id, processed, "batch acknowledged");
                Step {
                    outcome: StepOutcome::Delivered {
                        processed,
                        last_id,
                        acked: true,
                    },
                    delay: self.backoff.on_delivery(),
                }
            }
            Err(err) => {
                self.unacked = Some(last_id.clone());
                let failed = self.failed("ack", err);
                Step {
                    outcome: StepOutcome::Delivered {
                        processed,
                        last_id,
                        acked: false,
                    },
                    delay: failed.delay,
                }
            }
        }
    }

    /// Steps until `shutdown` resolves. Shutdown is observed while sleeping,
    /// never in the middle of a batch.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(client_id = %self.credentials.client_id, "delivery loop started");
        loop {
            let step = self.step().await;
            tokio::select! {
                _ = &mut shutdown => {
                    info!(cursor = ?self.cursor.position(), "delivery loop stopped");
                    return;
                }
                _ = self.sleeper.sleep(step.delay) => {}
            }
        }
    }

    async fn process(&self, message: &Message) {
        let context = message.recipient_context(&self.credentials.client_id);
        let plaintext: Value = match crypto::decrypt(&self.key, &message.sealed, &context) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                warn!(message_id = %message.id, error = %err, "skipping undecryptable message");
                return;
            }
        };
        let inbound = InboundMessage {
            message: message.clone(),
            plaintext,
        };
        let handled = AssertUnwindSafe(self.handler.handle(&inbound, &self.credentials))
            .catch_unwind()
            .await;
        match handled {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(message_id = %message.id, error = %format!("{err:#}"), "handler failed"),
            Err(_) => error!(message_id = %message.id, "handler panicked"),
        }
    }

    fn failed(&mut self, operation: &'static str, err: RelayError) -> Step {
        let class = err.class();
        let delay = match class {
            ErrorClass::AuthExpired => self.backoff.on_auth_expired(),
            ErrorClass::Transient | ErrorClass::Fatal => self.backoff.on_idle(),
        };
        let status = err.status();
        match class {
            ErrorClass::AuthExpired => error!(
                operation,
                cursor = ?self.cursor.position(),
                retry_secs = delay.as_secs(),
                hint = err.hint().unwrap_or_default(),
                "{err}"
            ),
            _ => warn!(
                operation,
                status = ?status,
                cursor = ?self.cursor.position(),
                retry_secs = delay.as_secs(),
                hint = err.hint().unwrap_or_default(),
                "{err}"
            ),
        }
        Step {
            outcome: StepOutcome::Failed(class),
            delay,
        }
    }
}

/// Drains the backlog without handling it: polls and acks until the relay
/// returns nothing newer than the cursor. Safe to repeat.
pub async fn discard_pending(
    transport: &dyn RelayTransport,
    credentials: &Credentials,
    start: Cursor,
) -> Result<Cursor, RelayError> {
    let mut cursor = start;
    loop {
        let batch = transport.poll(credentials, &cursor).await?;
        let Some(last) = batch.iter().map(|m| &m.id).max().cloned() else {
            break;
        };
        if !cursor.advance(&last) {
            break;
        }
        transport.ack(credentials, &last).await?;
        info!(last_id = %last, discarded = batch.len(), "discarded pending messages");
    }
    Ok(cursor)
}
