//! High-level pipeline: orchestrates read → evict → discover → re-read → merge for one playlist.
//!
//! This module provides the top-level orchestration logic for "synchronising" the target
//! playlist with today's releases of every followed artist. One run:
//!   1. Reads the whole playlist
//!   2. Removes track rows added more than `eviction_days` ago, in batches of at most 100
//!   3. Reads the follow list
//!   4. Scans every followed artist for an album or single released today (see [`crate::scanner`])
//!   5. Re-reads the playlist, since it may have changed since step 1
//!   6. Appends each discovered track whose external id is not yet in the playlist, one at a time.
//!      Skipped entirely when the re-read did not complete.
//!
//! # Major Types
//! - [`SynchroniseConfig`]: target playlist, eviction threshold and pacing for a run
//! - [`SynchroniseReport`]: what every stage did, including the failures it tolerated
//!
//! # Responsibilities
//! - Strictly sequential: every request is awaited before the next one is issued
//! - Failures stay inside the smallest unit that can continue (page, batch, artist/category)
//! - Additions are fail-fast: the first failed append ends the merge for this run
//! - Nothing is rolled back; a later run picks up where this one stopped
//!
//! # Callable From
//! - The CLI crate and integration tests. Expects a [`CatalogApi`] and a [`Clock`].
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Pure helpers: [`eviction_threshold`], [`select_expired`]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::batch::{self, RemovalReport, REMOVAL_BATCH_LIMIT};
use crate::contract::{ApiError, CatalogApi, PlaylistEntry, Track};
use crate::dedup::PlaylistIndex;
use crate::pacing::{Clock, PacingConfig, RateLimiter};
use crate::paginate::{self, Paginated};
use crate::scanner::{ArtistScanReport, ReleaseScanner, ScanReport};

/// The top-level synchronise configuration.
#[derive(Debug, Clone)]
pub struct SynchroniseConfig {
    pub playlist_id: String,
    /// Track rows added longer ago than this many days are removed.
    pub eviction_days: u32,
    pub pacing: PacingConfig,
}

/// Rows older than this instant are evicted.
pub fn eviction_threshold(now: DateTime<Utc>, eviction_days: u32) -> DateTime<Utc> {
    now - ChronoDuration::days(i64::from(eviction_days))
}

/// Uris of the track rows added strictly before `threshold`, in playlist order.
/// Non-track rows and rows without an insertion time are never selected.
pub fn select_expired(entries: &[PlaylistEntry], threshold: DateTime<Utc>) -> Vec<String> {
    entries
        .iter()
        .filter(|entry| entry.added_at.is_some_and(|added_at| added_at < threshold))
        .filter_map(|entry| entry.item.as_track())
        .map(|track| track.uri.clone())
        .collect()
}

/// Outcome of one full playlist read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadReport {
    pub entries: usize,
    pub pages: usize,
    #[serde(skip)]
    pub error: Option<ApiError>,
}

impl<T> From<&Paginated<T>> for ReadReport {
    fn from(result: &Paginated<T>) -> Self {
        Self {
            entries: result.items.len(),
            pages: result.pages,
            error: result.error.clone(),
        }
    }
}

/// A track as reported by the merge step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    pub uri: String,
    pub name: String,
    pub artists: String,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            uri: track.uri.clone(),
            name: track.name.clone(),
            artists: track.artist_names(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    pub added: Vec<TrackSummary>,
    pub already_present: Vec<TrackSummary>,
    /// Candidates left untouched after a failed append.
    pub not_attempted: usize,
    #[serde(skip)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone)]
pub struct SynchroniseReport {
    pub initial_read: ReadReport,
    pub removal: RemovalReport,
    pub followed_artists: ReadReport,
    pub scan: Vec<ArtistScanReport>,
    /// Artist/category pairs abandoned because of a request failure.
    pub failed_categories: usize,
    pub candidates: usize,
    pub refreshed_read: ReadReport,
    pub merge: MergeReport,
}

impl SynchroniseReport {
    /// True when no stage had to tolerate a failure.
    pub fn is_clean(&self) -> bool {
        self.initial_read.error.is_none()
            && self.removal.failed.is_empty()
            && self.followed_artists.error.is_none()
            && self.failed_categories == 0
            && self.refreshed_read.error.is_none()
            && self.merge.error.is_none()
    }
}

/// Run one synchronisation cycle against `config.playlist_id`.
pub async fn synchronise<A>(
    config: &SynchroniseConfig,
    api: &A,
    clock: &dyn Clock,
) -> SynchroniseReport
where
    A: CatalogApi + ?Sized,
{
    let limiter = RateLimiter::new(clock);
    let pacing = &config.pacing;
    info!(playlist_id = %config.playlist_id, eviction_days = config.eviction_days, "[SYNC] Starting playlist synchronisation");

    // Steps 1 and 2: read the current playlist and evict old rows
    let (initial_read, removal) = {
        let initial = paginate::fetch_playlist(api, &limiter, &config.playlist_id, pacing.page_delay).await;
        let threshold = eviction_threshold(limiter.now(), config.eviction_days);
        let expired = select_expired(&initial.items, threshold);
        let removal = if expired.is_empty() {
            info!(%threshold, "[EVICT] No tracks to remove.");
            RemovalReport::default()
        } else {
            info!(%threshold, tracks = expired.len(), "[EVICT] Removing tracks added before threshold");
            let batches = batch::partition(expired, REMOVAL_BATCH_LIMIT);
            batch::remove_all(api, &limiter, &config.playlist_id, &batches, pacing.batch_delay).await
        };
        (ReadReport::from(&initial), removal)
    };

    // Step 3: who to scan
    let artists = paginate::fetch_followed_artists(api, &limiter, pacing.page_delay).await;
    let followed_artists = ReadReport::from(&artists);

    // Step 4: discover today's releases
    let scanner = ReleaseScanner::new(api, limiter, pacing.artist_budget);
    let scan = scanner.scan_all(&artists.items).await;
    match serde_json::to_string_pretty(&scan.artists) {
        Ok(json) => debug!(json = %json, "[SYNC][DEBUG] Scan report as JSON"),
        Err(e) => error!(error = ?e, "[SYNC][DEBUG] Failed to serialize scan report as JSON"),
    }
    let failed_categories = scan.failed_categories();
    let ScanReport {
        candidates,
        artists: scan,
    } = scan;
    let candidates = candidates.into_tracks();

    // Step 5: re-read, the playlist may have changed meanwhile
    let refreshed = paginate::fetch_playlist(api, &limiter, &config.playlist_id, pacing.page_delay).await;
    let refreshed_read = ReadReport::from(&refreshed);

    // Step 6: append what is not there yet
    let merge = if refreshed.is_complete() {
        let mut index = PlaylistIndex::from_entries(&refreshed.items);
        merge_candidates(
            api,
            &limiter,
            &config.playlist_id,
            &candidates,
            &mut index,
            pacing.add_delay,
        )
        .await
    } else {
        // Candidates are only ever checked against a complete read.
        error!(
            candidates = candidates.len(),
            entries_read = refreshed_read.entries,
            "[MERGE][ERROR] Playlist re-read incomplete, skipping all additions"
        );
        MergeReport {
            not_attempted: candidates.len(),
            ..MergeReport::default()
        }
    };

    let report = SynchroniseReport {
        initial_read,
        removal,
        followed_artists,
        scan,
        failed_categories,
        candidates: candidates.len(),
        refreshed_read,
        merge,
    };
    info!(
        removed = report.removal.removed,
        artists = report.followed_artists.entries,
        candidates = report.candidates,
        added = report.merge.added.len(),
        already_present = report.merge.already_present.len(),
        clean = report.is_clean(),
        "[SYNC] Playlist synchronisation finished"
    );
    report
}

/// Append every candidate missing from `index`, pausing `delay` before each append.
///
/// Stops at the first failed append; later candidates count as not attempted.
pub async fn merge_candidates<A>(
    api: &A,
    limiter: &RateLimiter<'_>,
    playlist_id: &str,
    candidates: &[Track],
    index: &mut PlaylistIndex,
    delay: Duration,
) -> MergeReport
where
    A: CatalogApi + ?Sized,
{
    let mut report = MergeReport::default();

    for (position, track) in candidates.iter().enumerate() {
        if index.contains(track) {
            info!(uri = %track.uri, "[MERGE] Skipped: {} - {}", track.artist_names(), track.name);
            report.already_present.push(TrackSummary::from(track));
            continue;
        }

        limiter.pause(delay).await;
        match api.add_items(playlist_id, std::slice::from_ref(&track.uri)).await {
            Ok(()) => {
                info!(uri = %track.uri, "[MERGE] Added: {} - {}", track.artist_names(), track.name);
                index.insert(track);
                report.added.push(TrackSummary::from(track));
            }
            Err(e) => {
                report.not_attempted = candidates.len() - position - 1;
                error!(
                    uri = %track.uri,
                    error = %e,
                    not_attempted = report.not_attempted,
                    "[MERGE][ERROR] Adding track failed, aborting remaining additions"
                );
                report.error = Some(e);
                break;
            }
        }
    }

    report
}
