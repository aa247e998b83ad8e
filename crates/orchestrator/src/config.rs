use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::workflow::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub collaborators: CollaboratorsConfig,
    pub pipeline: PipelineConfig,
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    pub transcription_url: Url,
    pub meeting_minutes_url: Url,
    pub file_management_url: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Used when the folder-creation step yields no path
    pub default_output_dir: PathBuf,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub probe_timeout_ms: u64,
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

const DEFAULT_TRANSCRIPTION_URL: &str = "http://localhost:5001";
const DEFAULT_MINUTES_URL: &str = "http://localhost:5002";
const DEFAULT_FILES_URL: &str = "http://localhost:5003";

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; missing keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RetryPolicy::default();

        let config = Config {
            server: ServerConfig {
                addr: lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:5000".to_string()),
            },
            collaborators: CollaboratorsConfig {
                transcription_url: parse_url(
                    "TRANSCRIPTION_SERVICE_URL",
                    &lookup("TRANSCRIPTION_SERVICE_URL").unwrap_or_else(|| DEFAULT_TRANSCRIPTION_URL.to_string()),
                )?,
                meeting_minutes_url: parse_url(
                    "MEETING_MINUTES_SERVICE_URL",
                    &lookup("MEETING_MINUTES_SERVICE_URL").unwrap_or_else(|| DEFAULT_MINUTES_URL.to_string()),
                )?,
                file_management_url: parse_url(
                    "FILE_MANAGEMENT_SERVICE_URL",
                    &lookup("FILE_MANAGEMENT_SERVICE_URL").unwrap_or_else(|| DEFAULT_FILES_URL.to_string()),
                )?,
            },
            pipeline: PipelineConfig {
                default_output_dir: lookup("DEFAULT_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./output")),
                retry: RetryPolicy::new(
                    parse_or("RETRY_MAX_ATTEMPTS", lookup("RETRY_MAX_ATTEMPTS"), defaults.max_attempts)?,
                    Duration::from_millis(parse_or(
                        "RETRY_BASE_DELAY_MS",
                        lookup("RETRY_BASE_DELAY_MS"),
                        defaults.base_delay.as_millis() as u64,
                    )?),
                    parse_or(
                        "RETRY_BACKOFF_MULTIPLIER",
                        lookup("RETRY_BACKOFF_MULTIPLIER"),
                        defaults.backoff_multiplier,
                    )?,
                ),
            },
            health: HealthConfig {
                probe_timeout_ms: parse_or("HEALTH_PROBE_TIMEOUT_MS", lookup("HEALTH_PROBE_TIMEOUT_MS"), 2000)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        let retry = &self.pipeline.retry;
        if retry.max_attempts == 0 {
            return Err(crate::Error::Config(
                "RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(crate::Error::Config(
                "RETRY_BACKOFF_MULTIPLIER must be a finite number >= 1.0".to_string(),
            ));
        }
        if self.health.probe_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "HEALTH_PROBE_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> crate::Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| crate::Error::Config(format!("{} has an invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

// Base URLs get a trailing slash so endpoint paths join under them.
fn parse_url(key: &str, raw: &str) -> crate::Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    let url = Url::parse(&raw)
        .map_err(|e| crate::Error::Config(format!("{} is not a valid URL '{}': {}", key, raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(crate::Error::Config(format!(
            "{} must use http or https, got '{}'",
            key,
            url.scheme()
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> crate::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_local_services() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server.addr, "0.0.0.0:5000");
        assert_eq!(config.collaborators.transcription_url.as_str(), "http://localhost:5001/");
        assert_eq!(config.collaborators.file_management_url.as_str(), "http://localhost:5003/");
        assert_eq!(config.pipeline.retry, RetryPolicy::default());
        assert_eq!(config.health.probe_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("SERVER_ADDR", "127.0.0.1:9000"),
            ("MEETING_MINUTES_SERVICE_URL", "http://minutes.internal/api"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("RETRY_BASE_DELAY_MS", "250"),
            ("RETRY_BACKOFF_MULTIPLIER", "1.5"),
            ("DEFAULT_OUTPUT_DIR", "/data/output"),
        ])
        .unwrap();

        assert_eq!(config.server.addr, "127.0.0.1:9000");
        assert_eq!(config.collaborators.meeting_minutes_url.as_str(), "http://minutes.internal/api/");
        assert_eq!(config.pipeline.retry.max_attempts, 5);
        assert_eq!(config.pipeline.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.pipeline.retry.backoff_multiplier, 1.5);
        assert_eq!(config.pipeline.default_output_dir, PathBuf::from("/data/output"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[("RETRY_MAX_ATTEMPTS", "0")]).is_err());
        assert!(load(&[("RETRY_MAX_ATTEMPTS", "three")]).is_err());
        assert!(load(&[("RETRY_BACKOFF_MULTIPLIER", "0.5")]).is_err());
        assert!(load(&[("TRANSCRIPTION_SERVICE_URL", "not a url")]).is_err());
        assert!(load(&[("FILE_MANAGEMENT_SERVICE_URL", "ftp://files")]).is_err());
    }
}
