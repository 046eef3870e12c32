/// `load_config` module: loads the static YAML config and the Spotify secrets from the environment.
///
/// This module is the only place where untrusted YAML is parsed and mapped to the core
/// [`SynchroniseConfig`]. Secrets never live in the YAML file.
///
/// # Responsibilities
/// - Parse the YAML file (`playlist_id`, `eviction_days`, optional `pacing`)
/// - Convert millisecond pacing fields into [`PacingConfig`], keeping defaults for absent fields
/// - Read `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET`, `SPOTIFY_REDIRECT_URI` and
///   `SPOTIFY_REFRESH_TOKEN`, reporting each missing variable by name
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{bail, Result};
use release_radar_core::pacing::{PacingConfig, RequestBudget};
use release_radar_core::synchronise::SynchroniseConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::auth::Credentials;

pub const CLIENT_ID_ENV: &str = "SPOTIFY_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "SPOTIFY_CLIENT_SECRET";
pub const REDIRECT_URI_ENV: &str = "SPOTIFY_REDIRECT_URI";
pub const REFRESH_TOKEN_ENV: &str = "SPOTIFY_REFRESH_TOKEN";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub playlist_id: String,
    pub eviction_days: u32,
    #[serde(default)]
    pub pacing: PacingSection,
}

/// Optional pacing overrides, in milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PacingSection {
    pub page_delay_ms: Option<u64>,
    pub batch_delay_ms: Option<u64>,
    pub add_delay_ms: Option<u64>,
    pub requests_per_window: Option<u32>,
    pub window_ms: Option<u64>,
}

impl PacingSection {
    pub fn into_pacing(self) -> Result<PacingConfig> {
        let defaults = PacingConfig::default();
        let requests = self
            .requests_per_window
            .unwrap_or(defaults.artist_budget.requests);
        if requests == 0 {
            bail!("pacing.requests_per_window must be at least 1");
        }
        let ms = |value: Option<u64>, default: Duration| value.map_or(default, Duration::from_millis);

        Ok(PacingConfig {
            page_delay: ms(self.page_delay_ms, defaults.page_delay),
            batch_delay: ms(self.batch_delay_ms, defaults.batch_delay),
            add_delay: ms(self.add_delay_ms, defaults.add_delay),
            artist_budget: RequestBudget::new(requests, ms(self.window_ms, defaults.artist_budget.per)),
        })
    }
}

/// Everything a `sync` run needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub synchronise: SynchroniseConfig,
    pub credentials: Credentials,
}

fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => {
            error!(env_var = name, "Required environment variable is empty");
            bail!("Environment variable {name} is set but empty")
        }
        Err(e) => {
            error!(env_var = name, error = ?e, "Required environment variable missing");
            bail!("Missing required environment variable {name}: {e}")
        }
    }
}

/// Read the Spotify secrets from the environment.
pub fn load_credentials() -> Result<Credentials> {
    Ok(Credentials {
        client_id: required_env(CLIENT_ID_ENV)?,
        client_secret: required_env(CLIENT_SECRET_ENV)?,
        redirect_uri: required_env(REDIRECT_URI_ENV)?,
        refresh_token: required_env(REFRESH_TOKEN_ENV)?,
    })
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: FileConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if raw.playlist_id.trim().is_empty() {
        bail!("playlist_id must not be empty");
    }

    let synchronise = SynchroniseConfig {
        playlist_id: raw.playlist_id.trim().to_string(),
        eviction_days: raw.eviction_days,
        pacing: raw.pacing.into_pacing()?,
    };
    let credentials = load_credentials()?;

    Ok(AppConfig {
        synchronise,
        credentials,
    })
}
