mod common;

use common::*;
use courier_client::registration::{ensure_registration, stored_credentials, Source};
use courier_client::relay::RelayError;
use courier_core::CredentialStore;
use tempfile::tempdir;

#[tokio::test]
async fn first_run_registers_and_persists() {
    let dir = tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("creds.json"));
    let relay = ScriptedRelay::new().then_register(Ok(credentials()));

    let (creds, source) = ensure_registration(&relay, &store, "fp-1", Some("desk"), false)
        .await
        .unwrap();

    assert_eq!(source, Source::Registered);
    assert_eq!(creds.fingerprint, "fp-1");
    assert_eq!(store.load().unwrap(), Some(creds));
}

#[tokio::test]
async fn matching_stored_credentials_are_reused() {
    let dir = tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("creds.json"));
    let stored = credentials();
    store.save(&stored).unwrap();
    let relay = ScriptedRelay::new();

    let (creds, source) = ensure_registration(&relay, &store, "fp-1", None, false)
        .await
        .unwrap();

    assert_eq!(source, Source::Stored);
    assert_eq!(creds, stored);
    assert_eq!(relay.registrations(), 0);
}

#[tokio::test]
async fn fingerprint_change_triggers_re_registration() {
    let dir = tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("creds.json"));
    store.save(&credentials()).unwrap();
    let mut fresh = credentials();
    fresh.client_id = "new-client".to_string();
    let relay = ScriptedRelay::new().then_register(Ok(fresh));

    let (creds, source) = ensure_registration(&relay, &store, "fp-2", None, false)
        .await
        .unwrap();

    assert_eq!(source, Source::Registered);
    assert_eq!(creds.client_id, "new-client");
    assert_eq!(store.load().unwrap().unwrap().fingerprint, "fp-2");
}

#[tokio::test]
async fn stored_credentials_with_broken_key_are_replaced() {
    let dir = tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("creds.json"));
    let mut broken = credentials();
    broken.personal_token = "not base64!".to_string();
    store.save(&broken).unwrap();
    let relay = ScriptedRelay::new().then_register(Ok(credentials()));

    let (_, source) = ensure_registration(&relay, &store, "fp-1", None, false)
        .await
        .unwrap();

    assert_eq!(source, Source::Registered);
    assert!(store.load().unwrap().unwrap().personal_key().is_ok());
}

#[tokio::test]
async fn force_registers_even_with_valid_credentials() {
    let dir = tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("creds.json"));
    store.save(&credentials()).unwrap();
    let relay = ScriptedRelay::new().then_register(Ok(credentials()));

    let (_, source) = ensure_registration(&relay, &store, "fp-1", None, true)
        .await
        .unwrap();

    assert_eq!(source, Source::Registered);
    assert_eq!(relay.registrations(), 1);
}

#[tokio::test]
async fn failed_registration_leaves_nothing_behind() {
    let dir = tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("creds.json"));
    let relay = ScriptedRelay::new().then_register(Err(RelayError::Registration {
        status: Some(422),
        detail: "fingerprint required".to_string(),
    }));

    let err = ensure_registration(&relay, &store, "fp-1", None, false)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("status 422"));
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn unusable_issued_key_is_not_persisted() {
    let dir = tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("creds.json"));
    let mut issued = credentials();
    issued.personal_token = "c2hvcnQ=".to_string();
    let relay = ScriptedRelay::new().then_register(Ok(issued));

    assert!(ensure_registration(&relay, &store, "fp-1", None, false)
        .await
        .is_err());
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn corrupt_store_falls_back_to_registration() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("creds.json");
    std::fs::write(&path, b"{").unwrap();
    let store = CredentialStore::new(&path);
    let relay = ScriptedRelay::new().then_register(Ok(credentials()));

    let (_, source) = ensure_registration(&relay, &store, "fp-1", None, false)
        .await
        .unwrap();

    assert_eq!(source, Source::Registered);
    assert!(store.load().unwrap().is_some());
}

#[test]
fn stored_credentials_flag_another_machine_without_replacing() {
    let dir = tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("creds.json"));
    let stored = credentials();
    store.save(&stored).unwrap();

    let (creds, matches) = stored_credentials(&store, "fp-1").unwrap();
    assert!(matches);
    assert_eq!(creds, stored);

    let (creds, matches) = stored_credentials(&store, "fp-2").unwrap();
    assert!(!matches);
    assert_eq!(creds, stored);
    assert_eq!(store.load().unwrap(), Some(stored));
}

#[test]
fn stored_credentials_require_registration() {
    let dir = tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("creds.json"));
    let err = stored_credentials(&store, "fp-1").unwrap_err().to_string();
    assert!(err.contains("courier register"), "{err}");
}
