use anyhow::Result;
use courier_core::{identity, paths};
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Friendly name sent on registration.
    pub client_name: String,
    pub credentials_path: PathBuf,
}

impl ClientConfig {
    /// Flags win over `COURIER_*` environment variables, which win over defaults.
    pub fn resolve(
        base_url: Option<String>,
        client_name: Option<String>,
        credentials_path: Option<PathBuf>,
    ) -> Result<Self> {
        let base_url = base_url
            .or_else(|| env_var("COURIER_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client_name = client_name
            .or_else(|| env_var("COURIER_CLIENT_NAME"))
            .unwrap_or_else(identity::display_name);
        let credentials_path = match credentials_path {
            Some(path) => path,
            None => paths::credentials_path()?,
        };
        Ok(Self {
            base_url: normalise_base_url(&base_url),
            client_name,
            credentials_path,
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn normalise_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
