//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in the binary (or rely on lazy Once).
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Once;
use std::time::Duration;
use tracing::info;

static INIT: Once = Once::new();

/// Directory holding `config.json` unless overridden.
const CONFIG_HOME_DEFAULT: &str = ".";

/// Seconds between presence polls.
pub const POLL_INTERVAL_SECS_DEFAULT: u64 = 60;

/// Load .env exactly once. Safe to call many times.
///
/// Falls back to the `.env` next to the crate manifest when the working
/// directory has none.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_ok() {
            return;
        }
        let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
        let _ = dotenv::from_filename(candidate);
    });
}

/// Common bootstrap for the binary: env once, then log where config lives.
pub fn bootstrap_cli(bin_name: &str) {
    init_env();
    info!(
        target = "bootstrap",
        bin = bin_name,
        config_home = %config_home().display(),
        poll_interval_secs = poll_interval().as_secs(),
        "environment loaded"
    );
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// Integration config directory (`UC_CONFIG_HOME`, as set by the hub runtime).
pub fn config_home() -> PathBuf {
    PathBuf::from(env_opt("UC_CONFIG_HOME").unwrap_or_else(|| CONFIG_HOME_DEFAULT.to_string()))
}

/// Presence poll interval (`XBOX_POLL_INTERVAL_SECS`, minimum one second).
pub fn poll_interval() -> Duration {
    let secs: u64 = env_parse("XBOX_POLL_INTERVAL_SECS", POLL_INTERVAL_SECS_DEFAULT);
    Duration::from_secs(secs.max(1))
}
