//! Machine identity: a stable fingerprint the relay uses to recognise a
//! returning client, plus an advisory display name.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const UNKNOWN_MAC: &str = "000000000000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineAttributes {
    pub hostname: String,
    pub platform: String,
    pub machine: String,
    pub mac: String,
    pub home: String,
}

impl MachineAttributes {
    /// Reads the attributes from the local OS. No network access.
    pub fn collect() -> Self {
        Self {
            hostname: os_hostname(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::FAMILY),
            machine: std::env::consts::ARCH.to_string(),
            mac: primary_mac(),
            home: directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().display().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn components(&self) -> BTreeMap<&'static str, &str> {
        BTreeMap::from([
            ("hostname", self.hostname.as_str()),
            ("platform", self.platform.as_str()),
            ("machine", self.machine.as_str()),
            ("mac", self.mac.as_str()),
            ("home", self.home.as_str()),
        ])
    }

    /// SHA-256 over `key:value` pairs sorted by key and joined with `|`, hex-encoded.
    pub fn fingerprint(&self) -> String {
        let joined = self
            .components()
            .iter()
            .map(|(key, value)| format!("{key}:{value}"))
            .collect::<Vec<_>>()
            .join("|");
        hex::encode(Sha256::digest(joined.as_bytes()))
    }
}

pub fn fingerprint() -> String {
    MachineAttributes::collect().fingerprint()
}

/// `host\user`, preferring `COMPUTERNAME` and `USERNAME`/`USER`/`LOGNAME` over OS lookups.
pub fn display_name() -> String {
    let host = std::env::var("COMPUTERNAME").ok();
    let user = ["USERNAME", "USER", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()));
    compose_display_name(host, &os_hostname(), user)
}

pub fn compose_display_name(
    host_override: Option<String>,
    os_host: &str,
    user: Option<String>,
) -> String {
    let host = host_override
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| os_host.to_string());
    let user = user.unwrap_or_else(|| "unknown".to_string());
    format!("{host}\\{user}")
}

fn os_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(target_os = "linux")]
fn primary_mac() -> String {
    let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
        return UNKNOWN_MAC.to_string();
    };
    let mut interfaces: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.file_name().map(|n| n != "lo").unwrap_or(false))
        .collect();
    interfaces.sort();
    interfaces
        .iter()
        .filter_map(|p| std::fs::read_to_string(p.join("address")).ok())
        .map(|addr| addr.trim().replace(':', "").to_ascii_lowercase())
        .find(|mac| mac.len() == 12 && mac != UNKNOWN_MAC)
        .unwrap_or_else(|| UNKNOWN_MAC.to_string())
}

#[cfg(not(target_os = "linux"))]
fn primary_mac() -> String {
    UNKNOWN_MAC.to_string()
}
