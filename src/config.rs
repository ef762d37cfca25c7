//! Service settings read from the environment at start-up.

use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_IMPORT_API_URL: &str = "http://localhost:8080/api/chapters/bulk";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: String,
    pub import_api_url: String,
    pub import_api_key: Option<String>,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            import_api_url: DEFAULT_IMPORT_API_URL.to_string(),
            import_api_key: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; missing or invalid values use the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        Config {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            import_api_url: lookup("CHAPTER_IMPORT_API_URL").unwrap_or(defaults.import_api_url),
            import_api_key: lookup("CHAPTER_IMPORT_API_KEY").filter(|key| !key.trim().is_empty()),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
        }
    }
}

fn parse_or<T: FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring invalid setting");
            default
        }),
        None => default,
    }
}
