use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::warn;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_DB: &str = "patchlist.db";

/// HTTP service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// SQLite database file for the document store.
    pub db_path: String,
    /// Directory uploads are spooled to while they are being read.
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            db_path: DEFAULT_DB.to_string(),
            upload_dir: std::env::temp_dir().join("patchlist-uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Read `PATCHLIST_BIND`, `PATCHLIST_DB`, `PATCHLIST_UPLOAD_DIR` and
    /// `PATCHLIST_MAX_UPLOAD_BYTES`. Unset or unparsable values fall back to
    /// the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = match var("PATCHLIST_BIND") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Ignoring PATCHLIST_BIND={raw:?}, using {DEFAULT_BIND}");
                defaults.bind
            }),
            None => defaults.bind,
        };

        let max_upload_bytes = match var("PATCHLIST_MAX_UPLOAD_BYTES") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!("Ignoring PATCHLIST_MAX_UPLOAD_BYTES={raw:?}");
                    defaults.max_upload_bytes
                }
            },
            None => defaults.max_upload_bytes,
        };

        Self {
            bind,
            db_path: var("PATCHLIST_DB").unwrap_or(defaults.db_path),
            upload_dir: var("PATCHLIST_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes,
        }
    }
}
