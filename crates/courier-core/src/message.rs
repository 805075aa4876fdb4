use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use crate::crypto::{Aad, Sealed};

/// Relay-assigned message id, used as the delivery cursor.
///
/// The relay may emit ids as JSON strings or integers. Decimal ids sort before
/// all other ids and compare numerically among themselves; the rest compare
/// as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_decimal(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }

    /// Digits without leading zeros; compares numerically by (length, text).
    fn magnitude(&self) -> &str {
        let trimmed = self.0.trim_start_matches('0');
        if trimmed.is_empty() {
            "0"
        } else {
            trimmed
        }
    }

    /// JSON form for request bodies: an integer when the id is one, a string otherwise.
    pub fn to_json(&self) -> Value {
        match self.0.parse::<u64>() {
            Ok(n) if n.to_string() == self.0 => Value::from(n),
            _ => Value::String(self.0.clone()),
        }
    }
}

impl Ord for MessageId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_decimal(), other.is_decimal()) {
            (true, true) => {
                let (a, b) = (self.magnitude(), other.magnitude());
                a.len()
                    .cmp(&b.len())
                    .then_with(|| a.cmp(b))
                    .then_with(|| self.0.cmp(&other.0))
            }
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl<'de> Visitor<'de> for IdVisitor {
            type Value = MessageId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a message id as string or non-negative integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<MessageId, E> {
                Ok(MessageId::new(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<MessageId, E> {
                Ok(MessageId::new(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<MessageId, E> {
                if v < 0 {
                    return Err(E::custom("message id must not be negative"));
                }
                Ok(MessageId::new(v.to_string()))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// Delivery progress: the last id acknowledged or about to be acknowledged.
/// `None` reads from the start of the client's queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor(Option<MessageId>);

impl Cursor {
    pub fn start() -> Self {
        Self(None)
    }

    pub fn at(id: MessageId) -> Self {
        Self(Some(id))
    }

    pub fn position(&self) -> Option<&MessageId> {
        self.0.as_ref()
    }

    /// Moves forward to `id`. Returns false (and stays put) when `id` is not newer.
    pub fn advance(&mut self, id: &MessageId) -> bool {
        match &self.0 {
            Some(current) if id <= current => false,
            _ => {
                self.0 = Some(id.clone());
                true
            }
        }
    }
}

/// A relay message as delivered by poll. Never mutated by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub sealed: Sealed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad: Option<Aad>,
}

impl Message {
    /// Stand-in for a poll entry whose envelope could not be read. Its empty
    /// sealed fields never authenticate, so delivery skips it like a tampered
    /// message and still acknowledges past it.
    pub fn unreadable(id: MessageId) -> Self {
        Self {
            id,
            created_at: None,
            kind: None,
            sealed: Sealed {
                ciphertext: String::new(),
                nonce: String::new(),
                tag: String::new(),
            },
            aad: None,
        }
    }

    /// Associated data the relay bound this message to: `{to: client_id, ts: created_at}`.
    pub fn recipient_context(&self, client_id: &str) -> Aad {
        let mut aad = Aad::new();
        aad.insert("to".into(), Value::String(client_id.to_string()));
        aad.insert(
            "ts".into(),
            self.created_at
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        aad
    }
}
