//! Relay plumbing: the transport seam the delivery loop talks to, its HTTP
//! implementation and the error taxonomy shared by both.

mod api_client;
pub mod diagnostics;
mod error;

pub use api_client::HttpRelay;
pub use error::{ErrorClass, RelayError};

use async_trait::async_trait;
use courier_core::{Credentials, Cursor, Envelope, Message, MessageId};

/// The four relay operations. Implemented over HTTP by [`HttpRelay`] and by
/// scripted fakes in tests.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Registers (or re-registers) this machine. Returned credentials carry
    /// `fingerprint`.
    async fn register(
        &self,
        fingerprint: &str,
        name: Option<&str>,
    ) -> Result<Credentials, RelayError>;

    /// Messages newer than `cursor`, ascending by id. Empty when there is nothing new.
    async fn poll(
        &self,
        credentials: &Credentials,
        cursor: &Cursor,
    ) -> Result<Vec<Message>, RelayError>;

    /// Acknowledges every message up to and including `last_received_id`.
    async fn ack(
        &self,
        credentials: &Credentials,
        last_received_id: &MessageId,
    ) -> Result<(), RelayError>;

    async fn send(&self, credentials: &Credentials, envelope: &Envelope) -> Result<(), RelayError>;
}
