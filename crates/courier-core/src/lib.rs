//! courier-core: envelope codec, machine identity and local credentials
//!
//! Everything here is transport-agnostic: no module performs network I/O.
//!
//! # Module layout
//! - `crypto`      AES-256-GCM envelope encrypt/decrypt with JSON associated data
//! - `identity`    machine fingerprint and display name
//! - `credentials` relay-issued credential set + JSON credential store
//! - `message`     relay message, message id ordering, delivery cursor
//! - `paths`       platform data directory resolution
//! - `error`       codec and store error types

pub mod credentials;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod message;
pub mod paths;

pub use credentials::{CredentialStore, Credentials};
pub use crypto::{Aad, Envelope, PersonalKey, Sealed};
pub use error::{CodecError, StoreError};
pub use message::{Cursor, Message, MessageId};
