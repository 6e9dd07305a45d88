use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ScoutConfig {
    pub chromium: ChromiumSection,
    pub user_agents: UserAgentSection,
    pub race: RaceSection,
    pub retry: RetrySection,
    pub fetch: FetchSection,
    pub site: SiteSection,
    pub output: OutputSection,
}

impl ScoutConfig {
    /// Checks the values serde cannot: URLs must parse and the retry budget
    /// must allow at least one attempt.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.site.base_url).map_err(|err| ConfigError::Invalid {
            field: "site.base_url",
            reason: err.to_string(),
        })?;
        Url::parse(&self.race.probe_target).map_err(|err| ConfigError::Invalid {
            field: "race.probe_target",
            reason: err.to_string(),
        })?;
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromiumSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub request_timeout_seconds: Option<u64>,
    pub lang: Option<String>,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: true,
            disable_gpu: true,
            request_timeout_seconds: None,
            lang: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserAgentSection {
    pub pool: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RaceSection {
    pub probe_target: String,
    pub attempt_timeout_ms: u64,
}

impl RaceSection {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for RaceSection {
    fn default() -> Self {
        Self {
            probe_target: "https://github.com/".to_string(),
            attempt_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: usize,
    pub schedule_ms: Vec<u64>,
    pub jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            schedule_ms: vec![1_000],
            jitter_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub load_timeout_ms: u64,
}

impl FetchSection {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            load_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    pub base_url: String,
    pub search_path: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            base_url: "https://github.com".to_string(),
            search_path: "/search".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub path: String,
    pub print: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            path: "output.json".to_string(),
            print: true,
        }
    }
}

pub fn load_scout_config<P: AsRef<Path>>(path: P) -> Result<ScoutConfig> {
    let config: ScoutConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/hubscout.toml");
        let config = load_scout_config(path).expect("fixture config should parse");
        assert!(config.chromium.headless);
        assert!(config.user_agents.pool.len() >= 2);
        assert_eq!(config.race.attempt_timeout(), Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.site.base_url, "https://github.com");
    }

    #[test]
    fn empty_document_falls_back_to_defaults() {
        let config: ScoutConfig = toml::from_str("").unwrap();
        assert_eq!(config.race.probe_target, "https://github.com/");
        assert_eq!(config.retry.schedule_ms, vec![1_000]);
        assert_eq!(config.output.path, "output.json");
        config.validate().unwrap();
    }

    #[test]
    fn partial_section_keeps_remaining_defaults() {
        let config: ScoutConfig = toml::from_str("[retry]\nmax_attempts = 5\n").unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.schedule_ms, vec![1_000]);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let config: ScoutConfig = toml::from_str("[retry]\nmax_attempts = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "retry.max_attempts",
                ..
            }
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_scout_config("/nonexistent/hubscout.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hubscout.toml"));
    }
}
