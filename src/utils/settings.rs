use crate::{
    LOG_ONLY,
    engine::{
        masterlist::DEFAULT_MASTERLISTS,
        query::DEFAULT_QUERY_TIMEOUT,
        refresh::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_CONCURRENT_QUERIES, RefreshConfig},
        schedule::DailySchedule,
    },
    utils::display,
};

use std::{
    io::{self, ErrorKind},
    ops::RangeInclusive,
    path::Path,
    time::Duration,
};

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{error, info, warn};

pub const SETTINGS: &str = "settings.json";

pub const QUERY_TIMEOUT_MS_RANGE: RangeInclusive<u64> = 100..=10_000;
pub const MAX_CONCURRENT_QUERIES_RANGE: RangeInclusive<usize> = 1..=4096;

const REFRESH_AT_FORMAT: &str = "%H:%M";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    #[serde(deserialize_with = "masterlists_deserializer")]
    pub masterlists: Vec<String>,
    #[serde(deserialize_with = "query_timeout_deserializer")]
    pub query_timeout_ms: u64,
    pub fetch_timeout_secs: u64,
    #[serde(deserialize_with = "concurrency_deserializer")]
    pub max_concurrent_queries: usize,
    #[serde(
        serialize_with = "refresh_at_serializer",
        deserialize_with = "refresh_at_deserializer"
    )]
    pub refresh_at: NaiveTime,
}

fn masterlists_deserializer<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let urls = Vec::<String>::deserialize(deserializer)?
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect::<Vec<_>>();

    if urls.is_empty() {
        return Ok(default_masterlists());
    }

    Ok(urls)
}

fn query_timeout_deserializer<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let timeout = i64::deserialize(deserializer)?;
    Ok(timeout.clamp(
        *QUERY_TIMEOUT_MS_RANGE.start() as i64,
        *QUERY_TIMEOUT_MS_RANGE.end() as i64,
    ) as u64)
}

fn concurrency_deserializer<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let limit = i64::deserialize(deserializer)?;
    Ok(limit.clamp(
        *MAX_CONCURRENT_QUERIES_RANGE.start() as i64,
        *MAX_CONCURRENT_QUERIES_RANGE.end() as i64,
    ) as usize)
}

fn refresh_at_serializer<S>(at: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&at.format(REFRESH_AT_FORMAT))
}

fn refresh_at_deserializer<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let at = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(at.trim(), REFRESH_AT_FORMAT).map_err(serde::de::Error::custom)
}

fn default_masterlists() -> Vec<String> {
    DEFAULT_MASTERLISTS.iter().map(|url| url.to_string()).collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            masterlists: default_masterlists(),
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT.as_millis() as u64,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            refresh_at: NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default(),
        }
    }
}

impl Settings {
    /// Reads `settings.json` from `local_env_dir`. A missing or unreadable file is replaced
    /// with the defaults, which are then returned.
    pub fn init(local_env_dir: &Path) -> Self {
        let settings_path = local_env_dir.join(SETTINGS);
        let mut not_found = false;

        let res = match std::fs::read(&settings_path) {
            Ok(data) => serde_json::from_slice::<Self>(&data).map_err(display::log_error),
            Err(err) => {
                if err.kind() == ErrorKind::NotFound {
                    not_found = true;
                    error!(name: LOG_ONLY, "{SETTINGS} not found")
                } else {
                    error!("Failed to read {SETTINGS}");
                    error!(name: LOG_ONLY, "{err}, reading file: {}", settings_path.display())
                };
                Err(())
            }
        };

        match res {
            Ok(settings) => {
                info!(name: LOG_ONLY, "Settings loaded!");
                settings
            }
            Err(()) => {
                let settings = Self::default();
                if let Err(err) = settings.write(&settings_path) {
                    error!(name: LOG_ONLY, "{err}, failed to write file: {}", settings_path.display())
                } else if not_found {
                    info!(name: LOG_ONLY, "Settings file created at: {}", settings_path.display())
                } else {
                    warn!("Invalid {SETTINGS} replaced with defaults")
                }
                settings
            }
        }
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)?;
        info!(name: LOG_ONLY, "{SETTINGS} saved!");
        Ok(())
    }

    #[inline]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    #[inline]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    #[inline]
    pub fn schedule(&self) -> DailySchedule {
        DailySchedule::new(self.refresh_at)
    }
}

impl From<&Settings> for RefreshConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            masterlists: settings.masterlists.clone(),
            query_timeout: settings.query_timeout(),
            fetch_timeout: settings.fetch_timeout(),
            max_concurrent_queries: settings.max_concurrent_queries,
        }
    }
}
