//! Environment-sourced configuration.
//!
//! Values are read from the process environment (after loading a `.env`
//! file if one exists). Empty variables count as unset, and a channel id of
//! `0` means "not configured".

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ArbinquerError, Result};
use crate::types::FeedId;

const DEFAULT_DISCORD_API: &str = "https://discord.com/api/v10";
const DEFAULT_EXPORTS_URL: &str = "https://browse.wf/warframe-public-export-plus/ExportRegions.json";
const DEFAULT_ARBYS_URL: &str = "https://browse.wf/arbys.txt";
const DEFAULT_INCURSIONS_URL: &str = "https://browse.wf/sp-incursions.txt";
const DEFAULT_INVASIONS_URL: &str = "https://oracle.browse.wf/invasions";
const DEFAULT_CYCLES_URL: &str = "https://api.warframestat.us/pc/";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbinquerConfig {
    pub enabled_feeds: Vec<FeedId>,
    pub discord: DiscordSettings,
    pub channels: ChannelsConfig,
    pub schedule: ScheduleConfig,
    pub reconcile: ReconcileConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordSettings {
    /// Never written back out by `config show`.
    #[serde(skip_serializing, default)]
    pub token: String,
    pub api_base: String,
}

/// Target channel per feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    pub arbitration: Option<String>,
    pub incursions: Option<String>,
    pub invasions: Option<String>,
    pub cycles: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minute of every UTC hour at which hourly feeds refresh.
    pub poll_hour_minute: u8,
    pub invasions_interval_secs: u64,
    pub cycle_margin_secs: u64,
    pub cycle_fallback_secs: u64,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub run_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_hour_minute: 1,
            invasions_interval_secs: 300,
            cycle_margin_secs: 5,
            cycle_fallback_secs: 300,
            backoff_base_secs: 30,
            backoff_max_secs: 1800,
            run_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// How many recent channel messages the cleanup pass scans.
    pub history_limit: usize,
    /// Pause between consecutive cleanup deletes.
    pub delete_pause_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            delete_pause_ms: 600,
        }
    }
}

/// Feed endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub lang: String,
    pub exports_url: String,
    pub dict_url: String,
    pub arbys_url: String,
    pub incursions_url: String,
    pub invasions_url: String,
    pub cycles_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            lang: "en".into(),
            exports_url: DEFAULT_EXPORTS_URL.into(),
            dict_url: default_dict_url("en"),
            arbys_url: DEFAULT_ARBYS_URL.into(),
            incursions_url: DEFAULT_INCURSIONS_URL.into(),
            invasions_url: DEFAULT_INVASIONS_URL.into(),
            cycles_url: DEFAULT_CYCLES_URL.into(),
        }
    }
}

fn default_dict_url(lang: &str) -> String {
    format!("https://browse.wf/warframe-public-export-plus/dict.{lang}.json")
}

impl ArbinquerConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ArbinquerError::config(format!("cannot read .env: {e}"))),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Only malformed values fail
    /// here; call [`validate`](Self::validate) before running.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let channel = |key: &str| get(key).filter(|v| v != "0");

        let enabled_feeds = match get("ENABLED_FEEDS") {
            Some(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(FeedId::from_str)
                .collect::<Result<Vec<_>>>()?,
            None => FeedId::ALL.to_vec(),
        };

        let main_channel = channel("CHANNEL_ID");
        let channels = ChannelsConfig {
            arbitration: main_channel.clone(),
            incursions: channel("INCURSIONS_CHANNEL_ID").or(main_channel),
            invasions: channel("INVASIONS_CHANNEL_ID"),
            cycles: channel("CYCLES_CHANNEL_ID").or_else(|| channel("EARTH_CYCLE_CHANNEL_ID")),
        };

        let defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            poll_hour_minute: parse_or(&get, "POLL_HOUR_MINUTE", defaults.poll_hour_minute)?,
            invasions_interval_secs: parse_or(&get, "INVASIONS_INTERVAL_SECS", defaults.invasions_interval_secs)?,
            cycle_margin_secs: parse_or(&get, "CYCLE_MARGIN_SECS", defaults.cycle_margin_secs)?,
            cycle_fallback_secs: parse_or(&get, "CYCLE_FALLBACK_SECS", defaults.cycle_fallback_secs)?,
            backoff_base_secs: parse_or(&get, "BACKOFF_BASE_SECS", defaults.backoff_base_secs)?,
            backoff_max_secs: parse_or(&get, "BACKOFF_MAX_SECS", defaults.backoff_max_secs)?,
            run_on_startup: parse_or(&get, "RUN_ON_STARTUP", defaults.run_on_startup)?,
        };

        let reconcile_defaults = ReconcileConfig::default();
        let reconcile = ReconcileConfig {
            history_limit: parse_or(&get, "CLEANUP_HISTORY_LIMIT", reconcile_defaults.history_limit)?,
            delete_pause_ms: parse_or(&get, "DELETE_PAUSE_MS", reconcile_defaults.delete_pause_ms)?,
        };

        let source_defaults = SourcesConfig::default();
        let lang = get("FEED_LANG").unwrap_or(source_defaults.lang);
        let sources = SourcesConfig {
            dict_url: get("DICT_URL").unwrap_or_else(|| default_dict_url(&lang)),
            lang,
            exports_url: get("EXPORTS_URL").unwrap_or(source_defaults.exports_url),
            arbys_url: get("ARBYS_URL").unwrap_or(source_defaults.arbys_url),
            incursions_url: get("INCURSIONS_URL").unwrap_or(source_defaults.incursions_url),
            invasions_url: get("INVASIONS_URL").unwrap_or(source_defaults.invasions_url),
            cycles_url: get("OPEN_WORLD_CYCLES_URL").unwrap_or(source_defaults.cycles_url),
        };

        let config = Self {
            enabled_feeds,
            discord: DiscordSettings {
                token: get("DISCORD_TOKEN").unwrap_or_default(),
                api_base: get("DISCORD_API_BASE").unwrap_or_else(|| DEFAULT_DISCORD_API.into()),
            },
            channels,
            schedule,
            reconcile,
            sources,
        };
        Ok(config)
    }

    /// Fail fast on settings the process cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.discord.token.is_empty() {
            return Err(ArbinquerError::config("missing env var DISCORD_TOKEN"));
        }
        self.validate_offline()
    }

    /// Everything [`validate`](Self::validate) checks except credentials.
    /// Used by dry runs, which never talk to Discord.
    pub fn validate_offline(&self) -> Result<()> {
        if self.schedule.poll_hour_minute > 59 {
            return Err(ArbinquerError::config(format!(
                "POLL_HOUR_MINUTE must be 0-59, got {}",
                self.schedule.poll_hour_minute
            )));
        }
        if self.schedule.invasions_interval_secs == 0 {
            return Err(ArbinquerError::config("INVASIONS_INTERVAL_SECS must be positive"));
        }
        if self.schedule.backoff_base_secs == 0 || self.schedule.backoff_max_secs < self.schedule.backoff_base_secs {
            return Err(ArbinquerError::config(
                "BACKOFF_BASE_SECS must be positive and not exceed BACKOFF_MAX_SECS",
            ));
        }
        for feed in &self.enabled_feeds {
            if self.channel_for(*feed).is_none() {
                return Err(ArbinquerError::config(format!(
                    "feed '{feed}' is enabled but {} is not set",
                    channel_var(*feed)
                )));
            }
        }
        Ok(())
    }

    /// Target channel for a feed, if configured.
    pub fn channel_for(&self, feed: FeedId) -> Option<&str> {
        match feed {
            FeedId::Arbitration => self.channels.arbitration.as_deref(),
            FeedId::Incursions => self.channels.incursions.as_deref(),
            FeedId::Invasions => self.channels.invasions.as_deref(),
            FeedId::Cycles => self.channels.cycles.as_deref(),
        }
    }

    /// TOML rendering for `config show` (token omitted).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ArbinquerError::config(format!("cannot serialize config: {e}")))
    }
}

fn channel_var(feed: FeedId) -> &'static str {
    match feed {
        FeedId::Arbitration => "CHANNEL_ID",
        FeedId::Incursions => "INCURSIONS_CHANNEL_ID (or CHANNEL_ID)",
        FeedId::Invasions => "INVASIONS_CHANNEL_ID",
        FeedId::Cycles => "CYCLES_CHANNEL_ID",
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ArbinquerError::config(format!("invalid value for {key} ({raw}): {e}"))),
        None => Ok(default),
    }
}
