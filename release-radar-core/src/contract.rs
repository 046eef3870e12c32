//! # contract: catalog/playlist service interface and the data it exchanges
//!
//! This module defines the single seam between the synchronisation pipeline and the
//! remote music service: the [`CatalogApi`] trait, plus the plain data types it
//! returns (artists, releases, tracks, playlist entries and pages).
//!
//! ## Interface & Extensibility
//! - Implement [`CatalogApi`] to connect a real service (the CLI crate ships a Spotify client).
//! - All methods are async and return [`ApiError`] on failure; the pipeline never retries.
//! - Paging is explicit: list endpoints return a [`Page`] with the cursor of the next page,
//!   and the caller drives the loop (see [`crate::paginate`]).
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall` so tests can script every request deterministically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use mockall::{automock, predicate::*};

/// A followed artist. Identity is the catalog id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

/// Category of a release as classified by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReleaseGroup {
    Album,
    /// Singles and EPs.
    Single,
}

impl ReleaseGroup {
    /// Query value understood by the catalog's `include_groups` filter.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseGroup::Album => "album",
            ReleaseGroup::Single => "single",
        }
    }
}

impl std::fmt::Display for ReleaseGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A release as listed on an artist's discography page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseSummary {
    pub id: String,
    pub name: String,
    /// Raw date string; precision may be year, month or day.
    pub release_date: String,
}

/// A track as listed inside a release. Carries no external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackRef {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub artists: Vec<Artist>,
    pub track_number: u32,
}

/// A release with its full track listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Release {
    pub id: String,
    pub name: String,
    pub release_date: String,
    pub tracks: Vec<TrackRef>,
}

/// Full track detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub artists: Vec<Artist>,
    /// Catalog-wide identifier (ISRC on Spotify). The only deduplication key.
    pub external_id: Option<String>,
    pub track_number: u32,
}

impl Track {
    /// Artist names joined for log output.
    pub fn artist_names(&self) -> String {
        join_artist_names(&self.artists)
    }
}

impl TrackRef {
    pub fn artist_names(&self) -> String {
        join_artist_names(&self.artists)
    }
}

fn join_artist_names(artists: &[Artist]) -> String {
    artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// What a playlist row points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PlaylistItem {
    Track(Track),
    /// Episodes, unavailable or removed items. Never evicted, never matched.
    Other { uri: Option<String> },
}

impl PlaylistItem {
    pub fn as_track(&self) -> Option<&Track> {
        match self {
            PlaylistItem::Track(track) => Some(track),
            PlaylistItem::Other { .. } => None,
        }
    }
}

/// One row of the target playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistEntry {
    pub item: PlaylistItem,
    /// Very old playlists report no insertion time for some rows; those are never evicted.
    pub added_at: Option<DateTime<Utc>>,
}

/// One page of a paginated listing, with the cursor of the following page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    /// `None` when the service reports no further page.
    pub next: Option<C>,
}

/// A failed request against the remote service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("service returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request could not be sent: {0}")]
    Transport(String),
    #[error("response could not be decoded: {0}")]
    Decode(String),
}

/// Trait for reading the catalog and editing the target playlist.
///
/// Implementors own authentication and transport. Every method issues exactly one
/// request, which callers count for rate limiting.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// One page of the current user's followed artists, starting after the given cursor.
    async fn followed_artists(
        &self,
        after: Option<String>,
        limit: u32,
    ) -> Result<Page<Artist, String>, ApiError>;

    /// The most recent releases of one group for an artist.
    async fn artist_releases(
        &self,
        artist_id: &str,
        group: ReleaseGroup,
        limit: u32,
    ) -> Result<Vec<ReleaseSummary>, ApiError>;

    /// A release with its track listing.
    async fn release(&self, release_id: &str) -> Result<Release, ApiError>;

    /// Full detail for one track, including its external id.
    async fn track(&self, track_id: &str) -> Result<Track, ApiError>;

    /// One page of playlist rows starting at `offset`. `next` is the offset of the following page.
    async fn playlist_items(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<PlaylistEntry, u32>, ApiError>;

    /// Append tracks to the end of the playlist, in the given order.
    async fn add_items(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError>;

    /// Remove every occurrence of the given tracks. At most 100 uris per call.
    async fn remove_items(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError>;
}
