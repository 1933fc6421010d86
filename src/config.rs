use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Crate configuration: where databases live and how patient the
/// connection/transaction layers are.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub timings: Timings,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".recruitdb"),
            timings: Timings::default(),
        }
    }
}

/// Deadline and retry tuning. Defaults are the contract values; tests and
/// deployments on slow disks can override them via `recruitdb.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Deadline for a single database open attempt.
    pub open_timeout_ms: u64,
    /// Open attempts before giving up.
    pub open_attempts: u32,
    /// Base of the exponential open backoff (doubles per failed attempt).
    pub open_backoff_ms: u64,
    /// Deadline for a single transaction attempt.
    pub tx_timeout_ms: u64,
    /// Transaction retries after the first failure.
    pub tx_retries: u32,
    /// Linear transaction backoff step.
    pub tx_backoff_ms: u64,
    /// Attempts for the bulk recruit clear, which reopens the connection
    /// between attempts instead of using the generic retry path.
    pub clear_attempts: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            open_timeout_ms: 10_000,
            open_attempts: 3,
            open_backoff_ms: 1_000,
            tx_timeout_ms: 5_000,
            tx_retries: 2,
            tx_backoff_ms: 100,
            clear_attempts: 3,
        }
    }
}

impl Timings {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Delay after the given failed open attempt (1-based): `base * 2^attempt`.
    pub fn open_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.open_backoff_ms) * 2u32.saturating_pow(attempt)
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout_ms)
    }

    /// Delay after the given failed transaction attempt (1-based): `step * attempt`.
    pub fn tx_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.tx_backoff_ms) * attempt
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("recruitdb.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedules() {
        let timings = Timings::default();
        assert_eq!(timings.open_backoff(1), Duration::from_secs(2));
        assert_eq!(timings.open_backoff(2), Duration::from_secs(4));
        assert_eq!(timings.tx_backoff(1), Duration::from_millis(100));
        assert_eq!(timings.tx_backoff(2), Duration::from_millis(200));
    }

    #[test]
    fn config_toml_round_trip() {
        let config = StoreConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: StoreConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.timings, config.timings);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let parsed: StoreConfig = toml::from_str("data_dir = \"/tmp/rdb\"").unwrap();
        assert_eq!(parsed.data_dir, PathBuf::from("/tmp/rdb"));
        assert_eq!(parsed.timings, Timings::default());
    }
}
