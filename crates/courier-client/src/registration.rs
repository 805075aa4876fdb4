use anyhow::{anyhow, Context, Result};
use courier_core::{CredentialStore, Credentials};
use tracing::{info, warn};

use crate::relay::RelayTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Stored,
    Registered,
}

/// Reuses stored credentials when they belong to `fingerprint` and carry a
/// usable key; otherwise registers and persists the fresh set. Nothing is
/// written unless registration fully succeeds.
pub async fn ensure_registration(
    transport: &dyn RelayTransport,
    store: &CredentialStore,
    fingerprint: &str,
    name: Option<&str>,
    force: bool,
) -> Result<(Credentials, Source)> {
    if force {
        info!("re-registration forced");
    } else {
        match store.load() {
            Ok(Some(stored)) if stored.matches_fingerprint(fingerprint) => {
                match stored.personal_key() {
                    Ok(_) => {
                        info!(client_id = %stored.client_id, "using stored credentials");
                        return Ok((stored, Source::Stored));
                    }
                    Err(err) => warn!(error = %err, "stored personal token unusable; re-registering"),
                }
            }
            Ok(Some(stored)) => info!(
                stored = %stored.fingerprint,
                current = %fingerprint,
                "stored credentials belong to another machine; re-registering"
            ),
            Ok(None) => info!(path = %store.path().display(), "no stored credentials; registering"),
            Err(err) => warn!(error = %err, "stored credentials unreadable; re-registering"),
        }
    }

    let mut issued = transport.register(fingerprint, name).await.map_err(|err| {
        anyhow!(
            "{err}. Check that the relay is reachable and accepts registrations, then retry."
        )
    })?;
    issued
        .personal_key()
        .map_err(|err| anyhow!("relay issued an unusable personal token: {err}"))?;
    if issued.client_id.is_empty() || issued.api_token.is_empty() {
        return Err(anyhow!("relay issued incomplete credentials"));
    }
    issued.fingerprint = fingerprint.to_string();
    store
        .save(&issued)
        .with_context(|| format!("saving credentials to {}", store.path().display()))?;
    info!(client_id = %issued.client_id, "registered with relay");
    Ok((issued, Source::Registered))
}

/// Loads the stored credentials for a one-shot command that must not
/// re-register. Credentials issued to another machine are still returned,
/// with a warning; the flag reports whether they match `fingerprint`.
pub fn stored_credentials(store: &CredentialStore, fingerprint: &str) -> Result<(Credentials, bool)> {
    let stored = store
        .load()?
        .ok_or_else(|| anyhow!("not registered; run `courier register` first"))?;
    let matches = stored.matches_fingerprint(fingerprint);
    if !matches {
        warn!(
            client_id = %stored.client_id,
            stored = %stored.fingerprint,
            current = %fingerprint,
            "stored credentials belong to another machine; run `courier register` to re-register"
        );
    }
    Ok((stored, matches))
}
