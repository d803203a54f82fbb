use std::time::Duration;

use anyhow::Result;
use chrono::Duration as ChronoDuration;
use config::{Config, File};
use serde::Deserialize;
use url::Url;

pub(crate) const DEFAULT_APPLICATION_VERSION: &str = "2.48.0-1";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Thresholds {
    pub(crate) current_application_version: String,
    #[serde(with = "humantime_serde")]
    pub(crate) outdated_sync: Duration,
    #[serde(with = "humantime_serde")]
    pub(crate) offline_alert: Duration,
    #[serde(with = "humantime_serde")]
    pub(crate) details_span: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            current_application_version: DEFAULT_APPLICATION_VERSION.to_string(),
            outdated_sync: Duration::from_secs(3 * 24 * 60 * 60),
            offline_alert: Duration::from_secs(90 * 24 * 60 * 60),
            details_span: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl Thresholds {
    pub(crate) fn outdated_sync(&self) -> ChronoDuration {
        to_chrono(self.outdated_sync)
    }

    pub(crate) fn offline_alert(&self) -> ChronoDuration {
        to_chrono(self.offline_alert)
    }

    pub(crate) fn details_span(&self) -> ChronoDuration {
        to_chrono(self.details_span)
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) base_url: String,
    pub(crate) session_url: String,
    pub(crate) user_agent: String,
    #[serde(with = "humantime_serde")]
    pub(crate) request_timeout: Duration,
    pub(crate) max_concurrent_checks: usize,
    pub(crate) max_fetch_attempts: u32,
    pub(crate) cache_path: String,
    pub(crate) session_path: String,
    pub(crate) thresholds: Thresholds,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://backend.homeinfo.de/sysmon".to_string(),
            session_url: "https://his.homeinfo.de/session".to_string(),
            user_agent: concat!("sysmon-dash/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
            max_concurrent_checks: 4,
            max_fetch_attempts: 3,
            cache_path: "state/systems.json".to_string(),
            session_path: "state/session.json".to_string(),
            thresholds: Thresholds::default(),
        }
    }
}

impl Settings {
    pub(crate) fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url)
            .map_err(|e| anyhow::anyhow!("invalid base_url {:?}: {}", self.base_url, e))?;
        Url::parse(&self.session_url)
            .map_err(|e| anyhow::anyhow!("invalid session_url {:?}: {}", self.session_url, e))?;
        if self.max_concurrent_checks == 0 {
            anyhow::bail!("max_concurrent_checks must be at least 1");
        }
        if self.max_fetch_attempts == 0 {
            anyhow::bail!("max_fetch_attempts must be at least 1");
        }
        if ChronoDuration::from_std(self.thresholds.outdated_sync).is_err()
            || ChronoDuration::from_std(self.thresholds.offline_alert).is_err()
        {
            anyhow::bail!("threshold durations are too large");
        }
        Ok(())
    }
}

pub(crate) fn load_settings() -> Result<Settings> {
    let settings = Config::builder()
        .add_source(File::with_name("config/default.toml").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;
    let settings: Settings = settings.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
