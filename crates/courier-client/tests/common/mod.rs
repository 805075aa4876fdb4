#![allow(dead_code)]

use async_trait::async_trait;
use courier_client::delivery::Sleeper;
use courier_client::handlers::{InboundMessage, MessageHandler};
use courier_client::relay::{RelayError, RelayTransport};
use courier_core::crypto;
use courier_core::{Credentials, Cursor, Envelope, Message, MessageId, PersonalKey};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const CLIENT_ID: &str = "c0ffee00-0000-4000-8000-000000000001";

pub fn credentials() -> Credentials {
    Credentials {
        client_id: CLIENT_ID.to_string(),
        api_token: "api-token".to_string(),
        personal_token: PersonalKey::generate().to_base64(),
        fingerprint: "fp-1".to_string(),
    }
}

/// A message the relay sealed for `creds`, stamped at a fixed time.
pub fn sealed_for(creds: &Credentials, id: &str, plaintext: Value) -> Message {
    let ts = format!("2024-05-01T12:00:{:02}+00:00", id.len() % 60);
    let key = creds.personal_key().unwrap();
    let envelope = crypto::encrypt(&key, &plaintext, &crypto::recipient_context(&creds.client_id, &ts)).unwrap();
    Message {
        id: MessageId::from(id),
        created_at: Some(ts),
        kind: plaintext.get("type").and_then(Value::as_str).map(str::to_string),
        sealed: envelope.sealed,
        aad: Some(envelope.aad),
    }
}

pub fn note(creds: &Credentials, id: &str) -> Message {
    sealed_for(creds, id, json!({"type": "note", "payload": {"id": id}}))
}

pub fn transient(operation: &'static str) -> RelayError {
    RelayError::Transport {
        operation,
        status: Some(503),
        detail: "unavailable".to_string(),
        hint: None,
    }
}

/// In-memory relay answering from scripts. Unscripted polls return nothing,
/// unscripted acks and sends succeed.
#[derive(Default)]
pub struct ScriptedRelay {
    polls: Mutex<VecDeque<Result<Vec<Message>, RelayError>>>,
    ack_results: Mutex<VecDeque<Result<(), RelayError>>>,
    registrations: Mutex<VecDeque<Result<Credentials, RelayError>>>,
    pub poll_cursors: Mutex<Vec<Option<MessageId>>>,
    pub ack_attempts: Mutex<Vec<MessageId>>,
    pub acked: Mutex<Vec<MessageId>>,
    pub sent: Mutex<Vec<Envelope>>,
    pub register_calls: AtomicUsize,
}

impl ScriptedRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_poll(self, result: Result<Vec<Message>, RelayError>) -> Self {
        self.polls.lock().push_back(result);
        self
    }

    pub fn then_ack(self, result: Result<(), RelayError>) -> Self {
        self.ack_results.lock().push_back(result);
        self
    }

    pub fn then_register(self, result: Result<Credentials, RelayError>) -> Self {
        self.registrations.lock().push_back(result);
        self
    }

    pub fn acked(&self) -> Vec<MessageId> {
        self.acked.lock().clone()
    }

    pub fn registrations(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayTransport for ScriptedRelay {
    async fn register(&self, fingerprint: &str, _name: Option<&str>) -> Result<Credentials, RelayError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let mut issued = self.registrations.lock().pop_front().unwrap_or_else(|| {
            Err(RelayError::Registration {
                status: Some(500),
                detail: "unscripted".to_string(),
            })
        })?;
        issued.fingerprint = fingerprint.to_string();
        Ok(issued)
    }

    async fn poll(&self, _credentials: &Credentials, cursor: &Cursor) -> Result<Vec<Message>, RelayError> {
        self.poll_cursors.lock().push(cursor.position().cloned());
        self.polls.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn ack(&self, _credentials: &Credentials, last_received_id: &MessageId) -> Result<(), RelayError> {
        self.ack_attempts.lock().push(last_received_id.clone());
        self.ack_results.lock().pop_front().unwrap_or(Ok(()))?;
        self.acked.lock().push(last_received_id.clone());
        Ok(())
    }

    async fn send(&self, _credentials: &Credentials, envelope: &Envelope) -> Result<(), RelayError> {
        self.sent.lock().push(envelope.clone());
        Ok(())
    }
}

/// Records requested sleeps and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn secs(&self) -> Vec<u64> {
        self.slept.lock().iter().map(Duration::as_secs).collect()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
        tokio::task::yield_now().await;
    }
}

/// Records what it saw; fails (or panics) on chosen ids.
#[derive(Default)]
pub struct RecordingHandler {
    pub seen: Mutex<Vec<(MessageId, Value)>>,
    pub fail_on: Vec<&'static str>,
    pub panic_on: Vec<&'static str>,
}

impl RecordingHandler {
    pub fn seen_ids(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(id, _)| id.to_string()).collect()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, inbound: &InboundMessage, _credentials: &Credentials) -> anyhow::Result<()> {
        self.seen.lock().push((inbound.id().clone(), inbound.plaintext.clone()));
        let id = inbound.id().as_str();
        if self.panic_on.iter().any(|p| *p == id) {
            panic!("handler blew up on {id}");
        }
        if self.fail_on.iter().any(|f| *f == id) {
            anyhow::bail!("handler rejected {id}");
        }
        Ok(())
    }
}
