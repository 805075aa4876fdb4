use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "courier";
pub const APP_NAME: &str = "courier";

pub const CREDENTIALS_FILE: &str = "client_credentials.json";

pub fn data_dir() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn credentials_path() -> anyhow::Result<PathBuf> {
    if let Ok(override_path) = std::env::var("COURIER_CREDENTIALS_PATH") {
        if !override_path.is_empty() {
            return Ok(PathBuf::from(override_path));
        }
    }
    Ok(data_dir()?.join(CREDENTIALS_FILE))
}
