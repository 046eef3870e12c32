///
/// This module implements the CLI interface for release-radar: command parsing, argument
/// validation and the `sync` entrypoint.
///
/// All pipeline logic (scanning, eviction, merging, pacing) lives in the [`release-radar-core`]
/// crate. This module only wires config, authentication and the Spotify client together.
///
/// ## How To Use
/// - For command-line users: use the installed `release-radar` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// ## Exit status
/// [`run`] returns `Ok` once a synchronisation cycle has run to the end, even when single
/// artists, batches or pages failed along the way; those are logged and summarised. Config,
/// authentication and client construction failures are returned as errors.
///
/// [`release-radar-core`]: ../../release-radar-core/
/// [`Cli`]: struct.Cli.html
/// [`run`]: fn.run.html
use crate::auth;
use crate::load_config::load_config;
use crate::spotify::SpotifyClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use release_radar_core::pacing::SystemClock;
use release_radar_core::synchronise::{synchronise, SynchroniseReport};
use std::path::PathBuf;

/// CLI for release-radar: keep a playlist filled with today's releases of followed artists.
#[derive(Parser)]
#[clap(
    name = "release-radar",
    version,
    about = "Evict stale tracks and append today's releases of followed artists to a Spotify playlist"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one synchronisation cycle using the given config file
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config } => {
            let config = load_config(&config)?;
            tracing::info!(command = "sync", playlist_id = %config.synchronise.playlist_id, "Starting synchronisation process");

            let access_token = auth::authenticate(&config.credentials)
                .await
                .context("Spotify authentication failed")?;
            let client = SpotifyClient::from_env(access_token)
                .context("Failed to construct Spotify client")?;
            tracing::info!(base_url = client.base_url(), "Spotify client ready");

            let clock = SystemClock::new();
            println!("Synchronise starting...");
            let report = synchronise(&config.synchronise, &client, &clock).await;
            print_summary(&report);

            if report.is_clean() {
                tracing::info!(command = "sync", "Synchronisation complete");
            } else {
                tracing::warn!(command = "sync", "Synchronisation complete with tolerated failures");
            }
            Ok(())
        }
    }
}

fn print_summary(report: &SynchroniseReport) {
    println!("Synchronise report:");
    println!(
        "  removed:          {} of {} ({} failed batches)",
        report.removal.removed,
        report.removal.requested,
        report.removal.failed.len()
    );
    println!(
        "  artists scanned:  {} ({} failed categories)",
        report.scan.len(),
        report.failed_categories
    );
    println!("  candidates:       {}", report.candidates);
    println!("  added:            {}", report.merge.added.len());
    println!("  already present:  {}", report.merge.already_present.len());
    if let Some(e) = &report.merge.error {
        println!("  additions aborted: {e} ({} not attempted)", report.merge.not_attempted);
    } else if let Some(e) = &report.refreshed_read.error {
        println!("  additions skipped: playlist re-read failed: {e}");
    }
    for track in &report.merge.added {
        println!("    + {} - {}", track.artists, track.name);
    }
}
