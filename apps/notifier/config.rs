use crate::{models::proposals::ProposalStatus, sync_engine::SyncConfig, tally_api};
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::{collections::HashSet, env, fs, time::Duration};
use tracing::{info, warn};
use utils::errors::{
    DISCORD_TOKEN_NOT_SET, PROPOSALS_CHANNEL_ID_NOT_SET, SYNC_INTERVAL_INVALID,
    TALLY_API_KEY_NOT_SET,
};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotifierConfig {
    pub discord_token: Option<String>,
    pub proposals_channel_id: Option<String>,
    pub tally_api_key: Option<String>,
    pub tally_org_id: String,
    pub tally_governor_slug: String,
    pub tally_api_url: String,
    pub tally_page_limit: u32,
    pub sync_interval_minutes: u64,
    pub post_delay_ms: u64,
    /// Statuses eligible for a first announcement; empty announces all.
    pub announce_statuses: Vec<String>,
    pub database_url: String,
    pub admin_bind_addr: String,
    /// Unset disables the admin route.
    pub admin_token: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            discord_token: None,
            proposals_channel_id: None,
            tally_api_key: None,
            tally_org_id: "2323517483434116775".to_string(),
            tally_governor_slug: "wormhole".to_string(),
            tally_api_url: tally_api::TALLY_GRAPHQL_ENDPOINT.to_string(),
            tally_page_limit: 20,
            sync_interval_minutes: 5,
            post_delay_ms: 1000,
            announce_statuses: Vec::new(),
            database_url: "sqlite://announced_proposals.db?mode=rwc".to_string(),
            admin_bind_addr: "0.0.0.0:3000".to_string(),
            admin_token: None,
        }
    }
}

/// Secrets that must be present before the service can start.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub discord_token: String,
    pub proposals_channel_id: String,
    pub tally_api_key: String,
}

impl NotifierConfig {
    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            discord_token: self.discord_token.clone().context(DISCORD_TOKEN_NOT_SET)?,
            proposals_channel_id: self
                .proposals_channel_id
                .clone()
                .context(PROPOSALS_CHANNEL_ID_NOT_SET)?,
            tally_api_key: self.tally_api_key.clone().context(TALLY_API_KEY_NOT_SET)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.credentials()?;
        if self.sync_interval_minutes == 0 {
            bail!(SYNC_INTERVAL_INVALID);
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_minutes * 60)
    }

    pub fn sync_config(&self) -> SyncConfig {
        let announce_statuses: HashSet<ProposalStatus> = self
            .announce_statuses
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<ProposalStatus>() {
                Ok(status) => status,
                Err(never) => match never {},
            })
            .collect();

        let mut config = SyncConfig::new(&self.tally_org_id, &self.tally_governor_slug);
        config.post_delay = Duration::from_millis(self.post_delay_ms);
        config.announce_statuses = (!announce_statuses.is_empty()).then_some(announce_statuses);
        config
    }
}

/// Reads the YAML file (if any), applies environment overrides and validates.
pub fn load() -> Result<NotifierConfig> {
    let path = env::var("NOTIFIER_CONFIG_PATH").unwrap_or_else(|_| "notifier.yaml".to_string());
    let mut config = match fs::read_to_string(&path) {
        Ok(contents) => match serde_yaml::from_str::<NotifierConfig>(&contents) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, path = %path, "Failed to parse notifier config, using defaults");
                NotifierConfig::default()
            }
        },
        Err(err) => {
            info!(error = %err, path = %path, "No notifier config file, using defaults");
            NotifierConfig::default()
        }
    };

    apply_overrides_from(&mut config, |key| env::var(key).ok())?;
    config.validate()?;

    info!(
        org_id = %config.tally_org_id,
        governor_slug = %config.tally_governor_slug,
        interval_minutes = config.sync_interval_minutes,
        page_limit = config.tally_page_limit,
        announce_statuses = ?config.announce_statuses,
        admin_enabled = config.admin_token.is_some(),
        "Notifier config loaded"
    );

    Ok(config)
}

/// Overrides config values with whatever `lookup` returns for each key.
/// Blank values count as unset.
pub fn apply_overrides_from<F>(config: &mut NotifierConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(value) = get("DISCORD_TOKEN") {
        config.discord_token = Some(value);
    }
    if let Some(value) = get("PROPOSALS_CHANNEL_ID") {
        config.proposals_channel_id = Some(value);
    }
    if let Some(value) = get("TALLY_API_KEY") {
        config.tally_api_key = Some(value);
    }
    if let Some(value) = get("TALLY_ORG_ID") {
        config.tally_org_id = value;
    }
    if let Some(value) = get("TALLY_GOVERNOR_SLUG") {
        config.tally_governor_slug = value;
    }
    if let Some(value) = get("TALLY_API_URL") {
        config.tally_api_url = value;
    }
    if let Some(value) = get("DATABASE_URL") {
        config.database_url = value;
    }
    if let Some(value) = get("ADMIN_BIND_ADDR") {
        config.admin_bind_addr = value;
    }
    if let Some(value) = get("ADMIN_TOKEN") {
        config.admin_token = Some(value);
    }

    if let Some(value) = get("SYNC_INTERVAL_MINUTES") {
        config.sync_interval_minutes = value
            .parse::<u64>()
            .map_err(|e| anyhow!("{SYNC_INTERVAL_INVALID}: {value:?} ({e})"))?;
    }

    if let Some(value) = get("TALLY_PAGE_LIMIT") {
        match value.parse::<u32>() {
            Ok(limit) if limit > 0 => config.tally_page_limit = limit,
            Ok(_) => warn!("TALLY_PAGE_LIMIT must be positive, keeping {}", config.tally_page_limit),
            Err(err) => warn!(error = %err, "Failed to parse TALLY_PAGE_LIMIT override"),
        }
    }

    if let Some(value) = get("POST_DELAY_MS") {
        match value.parse::<u64>() {
            Ok(delay) => config.post_delay_ms = delay,
            Err(err) => warn!(error = %err, "Failed to parse POST_DELAY_MS override"),
        }
    }

    if let Some(value) = lookup("ANNOUNCE_STATUSES") {
        config.announce_statuses = value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    Ok(())
}
