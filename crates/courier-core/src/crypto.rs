//! Envelope codec
//!
//! AES-256-GCM under the relay-issued personal key. Nonce: 12 random bytes per
//! envelope. Tag: 16 bytes, carried separately from the ciphertext.
//!
//! Plaintext and associated data are both serialised as compact JSON with keys
//! in insertion order. The associated data bytes must be reproduced exactly on
//! the decrypting side, so `{"to":..,"ts":..}` and `{"ts":..,"to":..}` are
//! different contexts.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::CodecError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Associated data: a JSON object whose key order is part of the authenticated bytes.
pub type Aad = Map<String, Value>;

/// 256-bit symmetric key decoded from a credential's `personal_token`.
pub struct PersonalKey(Zeroizing<[u8; KEY_LEN]>);

impl PersonalKey {
    pub fn from_base64(encoded: &str) -> Result<Self, CodecError> {
        let decoded = Zeroizing::new(
            general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| CodecError::InvalidKey(format!("personal token is not base64: {e}")))?,
        );
        if decoded.len() != KEY_LEN {
            return Err(CodecError::InvalidKey(format!(
                "personal token decodes to {} bytes, expected {KEY_LEN}",
                decoded.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&decoded);
        Ok(Self(key))
    }

    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(key.as_mut());
        Self(key)
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.0.as_ref())
    }

    fn cipher(&self) -> Result<Aes256Gcm, CodecError> {
        Aes256Gcm::new_from_slice(self.0.as_ref())
            .map_err(|_| CodecError::InvalidKey("AES-256 key must be 32 bytes".into()))
    }
}

impl fmt::Debug for PersonalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PersonalKey(<redacted>)")
    }
}

/// The three opaque fields of an encrypted payload, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sealed {
    pub ciphertext: String,
    pub nonce: String,
    pub tag: String,
}

/// Wire envelope submitted on send: sealed payload plus the associated data it is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub sealed: Sealed,
    #[serde(default)]
    pub aad: Aad,
}

/// AAD for a message addressed to `client_id`, stamped by the relay at `ts`.
pub fn recipient_context(client_id: &str, ts: &str) -> Aad {
    let mut aad = Aad::new();
    aad.insert("to".into(), Value::String(client_id.to_string()));
    aad.insert("ts".into(), Value::String(ts.to_string()));
    aad
}

/// AAD for a message sent by `client_id` at `ts`.
pub fn sender_context(client_id: &str, ts: &str) -> Aad {
    let mut aad = Aad::new();
    aad.insert("from".into(), Value::String(client_id.to_string()));
    aad.insert("ts".into(), Value::String(ts.to_string()));
    aad
}

/// Compact JSON with keys in insertion order.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(value)?)
}

fn aad_bytes(aad: &Aad) -> Result<Vec<u8>, CodecError> {
    // an empty context authenticates as no associated data at all
    if aad.is_empty() {
        return Ok(Vec::new());
    }
    canonical_bytes(aad)
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn encrypt<T: Serialize + ?Sized>(
    key: &PersonalKey,
    plaintext: &T,
    aad: &Aad,
) -> Result<Envelope, CodecError> {
    let cipher = key.cipher()?;
    let msg = Zeroizing::new(canonical_bytes(plaintext)?);
    let associated = aad_bytes(aad)?;
    let nonce = generate_nonce();

    let mut ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &msg,
                aad: &associated,
            },
        )
        .map_err(|_| CodecError::Encrypt)?;
    let tag = ciphertext.split_off(ciphertext.len() - TAG_LEN);

    Ok(Envelope {
        sealed: Sealed {
            ciphertext: general_purpose::STANDARD.encode(&ciphertext),
            nonce: general_purpose::STANDARD.encode(nonce),
            tag: general_purpose::STANDARD.encode(tag),
        },
        aad: aad.clone(),
    })
}

pub fn decrypt<T: DeserializeOwned>(
    key: &PersonalKey,
    sealed: &Sealed,
    aad: &Aad,
) -> Result<T, CodecError> {
    let mut combined = decode_field("ciphertext", &sealed.ciphertext)?;
    let nonce = decode_field("nonce", &sealed.nonce)?;
    let tag = decode_field("tag", &sealed.tag)?;
    if nonce.len() != NONCE_LEN {
        return Err(CodecError::MalformedEnvelope(format!(
            "nonce is {} bytes, expected {NONCE_LEN}",
            nonce.len()
        )));
    }
    if tag.len() != TAG_LEN {
        return Err(CodecError::MalformedEnvelope(format!(
            "tag is {} bytes, expected {TAG_LEN}",
            tag.len()
        )));
    }
    combined.extend_from_slice(&tag);

    let cipher = key.cipher()?;
    let associated = aad_bytes(aad)?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &combined,
                    aad: &associated,
                },
            )
            .map_err(|_| CodecError::AuthenticationFailure)?,
    );
    Ok(serde_json::from_slice(&plaintext)?)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CodecError> {
    general_purpose::STANDARD
        .decode(value)
        .map_err(|e| CodecError::MalformedEnvelope(format!("{name} is not base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Produced by an independent AES-GCM implementation with the same framing.
    const VECTOR_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";
    const VECTOR_CIPHERTEXT: &str = "MzmqHwmMdKQcFjqbrkdG3zKjf2bkDZdQnaqOJpTXwGquyygD5X73a9KEF02RJuiyN3nslAJwYxrKw5j737SIujnY6jzsews/u1/GcyGwAdZGBQ==";
    const VECTOR_NONCE: &str = "ZGVmZ2hpamtsbW5v";
    const VECTOR_TAG: &str = "FVbQj2tADRhVfTSUi6gOuA==";
    const VECTOR_CLIENT: &str = "c0ffee00-0000-4000-8000-000000000001";
    const VECTOR_TS: &str = "2024-05-01T12:00:00+00:00";

    fn flip_bit(encoded: &str, index: usize) -> String {
        let mut bytes = general_purpose::STANDARD.decode(encoded).unwrap();
        let i = index % bytes.len();
        bytes[i] ^= 0x01;
        general_purpose::STANDARD.encode(bytes)
    }

    fn sample_payload() -> Value {
        json!({"type": "test", "payload": {"n": 7, "text": "hello"}, "ts": VECTOR_TS})
    }

    #[test]
    fn round_trip_restores_plaintext() {
        let key = PersonalKey::generate();
        let aad = recipient_context("client-1", VECTOR_TS);
        let env = encrypt(&key, &sample_payload(), &aad).unwrap();
        let out: Value = decrypt(&key, &env.sealed, &aad).unwrap();
        assert_eq!(out, sample_payload());
        assert_eq!(env.aad, aad);
    }

    #[test]
    fn round_trip_with_empty_context() {
        let key = PersonalKey::generate();
        let env = encrypt(&key, &json!({"a": 1}), &Aad::new()).unwrap();
        let out: Value = decrypt(&key, &env.sealed, &Aad::new()).unwrap();
        assert_eq!(out, json!({"a": 1}));
    }

    #[test]
    fn decrypts_reference_vector() {
        let key = PersonalKey::from_base64(VECTOR_KEY).unwrap();
        let sealed = Sealed {
            ciphertext: VECTOR_CIPHERTEXT.into(),
            nonce: VECTOR_NONCE.into(),
            tag: VECTOR_TAG.into(),
        };
        let aad = recipient_context(VECTOR_CLIENT, VECTOR_TS);
        let out: Value = decrypt(&key, &sealed, &aad).unwrap();
        assert_eq!(
            out,
            json!({"type": "test", "payload": {"note": "héllo/world"}, "ts": VECTOR_TS})
        );
    }

    #[test]
    fn reference_vector_rejects_reordered_context() {
        let key = PersonalKey::from_base64(VECTOR_KEY).unwrap();
        let sealed = Sealed {
            ciphertext: VECTOR_CIPHERTEXT.into(),
            nonce: VECTOR_NONCE.into(),
            tag: VECTOR_TAG.into(),
        };
        let mut reordered = Aad::new();
        reordered.insert("ts".into(), json!(VECTOR_TS));
        reordered.insert("to".into(), json!(VECTOR_CLIENT));
        let err = decrypt::<Value>(&key, &sealed, &reordered).unwrap_err();
        assert!(matches!(err, CodecError::AuthenticationFailure));
    }

    #[test]
    fn tampered_fields_fail_authentication() {
        let key = PersonalKey::generate();
        let aad = recipient_context("client-1", VECTOR_TS);
        let env = encrypt(&key, &sample_payload(), &aad).unwrap();

        let ct_len = general_purpose::STANDARD
            .decode(&env.sealed.ciphertext)
            .unwrap()
            .len();
        for i in 0..ct_len {
            let mut sealed = env.sealed.clone();
            sealed.ciphertext = flip_bit(&sealed.ciphertext, i);
            let err = decrypt::<Value>(&key, &sealed, &aad).unwrap_err();
            assert!(matches!(err, CodecError::AuthenticationFailure), "ciphertext byte {i}");
        }
        for i in 0..TAG_LEN {
            let mut sealed = env.sealed.clone();
            sealed.tag = flip_bit(&sealed.tag, i);
            let err = decrypt::<Value>(&key, &sealed, &aad).unwrap_err();
            assert!(matches!(err, CodecError::AuthenticationFailure), "tag byte {i}");
        }
        for i in 0..NONCE_LEN {
            let mut sealed = env.sealed.clone();
            sealed.nonce = flip_bit(&sealed.nonce, i);
            let err = decrypt::<Value>(&key, &sealed, &aad).unwrap_err();
            assert!(matches!(err, CodecError::AuthenticationFailure), "nonce byte {i}");
        }
    }

    #[test]
    fn context_mismatch_fails_authentication() {
        let key = PersonalKey::generate();
        let aad = recipient_context("client-1", VECTOR_TS);
        let env = encrypt(&key, &sample_payload(), &aad).unwrap();

        let other_client = recipient_context("client-2", VECTOR_TS);
        let other_ts = recipient_context("client-1", "2024-05-01T12:00:01+00:00");
        let sender = sender_context("client-1", VECTOR_TS);
        for wrong in [other_client, other_ts, sender, Aad::new()] {
            let err = decrypt::<Value>(&key, &env.sealed, &wrong).unwrap_err();
            assert!(matches!(err, CodecError::AuthenticationFailure));
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let aad = recipient_context("client-1", VECTOR_TS);
        let env = encrypt(&PersonalKey::generate(), &sample_payload(), &aad).unwrap();
        let err = decrypt::<Value>(&PersonalKey::generate(), &env.sealed, &aad).unwrap_err();
        assert!(matches!(err, CodecError::AuthenticationFailure));
    }

    #[test]
    fn key_must_decode_to_32_bytes() {
        let short = general_purpose::STANDARD.encode([7u8; 16]);
        assert!(matches!(
            PersonalKey::from_base64(&short),
            Err(CodecError::InvalidKey(_))
        ));
        assert!(matches!(
            PersonalKey::from_base64("not base64!"),
            Err(CodecError::InvalidKey(_))
        ));
        let key = PersonalKey::generate();
        assert!(PersonalKey::from_base64(&key.to_base64()).is_ok());
    }

    #[test]
    fn truncated_nonce_is_malformed() {
        let key = PersonalKey::generate();
        let aad = Aad::new();
        let mut env = encrypt(&key, &json!({}), &aad).unwrap();
        env.sealed.nonce = general_purpose::STANDARD.encode([0u8; 8]);
        let err = decrypt::<Value>(&key, &env.sealed, &aad).unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope(_)));
    }

    #[test]
    fn nonces_are_fresh_per_envelope() {
        let key = PersonalKey::generate();
        let a = encrypt(&key, &json!({"x": 1}), &Aad::new()).unwrap();
        let b = encrypt(&key, &json!({"x": 1}), &Aad::new()).unwrap();
        assert_ne!(a.sealed.nonce, b.sealed.nonce);
        assert_ne!(a.sealed.ciphertext, b.sealed.ciphertext);
    }

    #[test]
    fn canonical_form_is_compact_and_ordered() {
        let aad = sender_context("a/b", "ü");
        let bytes = canonical_bytes(&aad).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\"from\":\"a/b\",\"ts\":\"ü\"}"
        );
    }

    #[test]
    fn envelope_serialises_flat() {
        let key = PersonalKey::generate();
        let env = encrypt(&key, &json!({}), &sender_context("c", "t")).unwrap();
        let wire = serde_json::to_value(&env).unwrap();
        assert!(wire.get("ciphertext").is_some());
        assert!(wire.get("nonce").is_some());
        assert!(wire.get("tag").is_some());
        assert_eq!(wire["aad"], json!({"from": "c", "ts": "t"}));
    }
}
