use std::path::PathBuf;

use crate::error::{BackendError, Result};

pub const APP_DIR_NAME: &str = "quotaboard";
pub const STORE_FILE_NAME: &str = "settings.json";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_STALE_SECS: u64 = 300;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Picks the provider store file: an explicit path wins, otherwise the platform data
/// directory.
pub fn resolve_store_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(path);
    }
    default_store_path()
}

fn default_store_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        BackendError::Path("could not determine the platform data directory".to_string())
    })?;
    Ok(data_dir.join(APP_DIR_NAME).join(STORE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_store_path_wins() {
        let path = PathBuf::from("/tmp/quotaboard/custom.json");
        assert_eq!(
            resolve_store_path(Some(path.clone())).expect("path should resolve"),
            path
        );
    }

    #[test]
    fn empty_store_path_falls_back_to_data_dir() {
        if dirs::data_dir().is_none() {
            return;
        }
        let path = resolve_store_path(Some(PathBuf::new())).expect("path should resolve");
        assert!(path.ends_with("quotaboard/settings.json"));
    }
}
