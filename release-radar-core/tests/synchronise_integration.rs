use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

use release_radar_core::contract::{
    ApiError, Artist, CatalogApi, Page, PlaylistEntry, PlaylistItem, Release, ReleaseGroup,
    ReleaseSummary, Track, TrackRef,
};
use release_radar_core::pacing::{Clock, ManualClock, PacingConfig};
use release_radar_core::synchronise::{synchronise, SynchroniseConfig};

const PLAYLIST: &str = "radar";

/// In-memory catalog and playlist, driven by the same manual clock as the pipeline.
struct FakeCatalog {
    clock: Arc<ManualClock>,
    artists: Vec<Artist>,
    releases: HashMap<(String, ReleaseGroup), Vec<ReleaseSummary>>,
    release_details: HashMap<String, Release>,
    tracks: HashMap<String, Track>,
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    playlist: Vec<PlaylistEntry>,
    add_calls: usize,
    fail_add_on_call: Option<usize>,
    remove_calls: Vec<usize>,
    track_fetches: Vec<String>,
    playlist_reads: usize,
    fail_playlist_read_on_call: Option<usize>,
    fail_releases_for: Vec<String>,
}

impl FakeCatalog {
    fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            artists: Vec::new(),
            releases: HashMap::new(),
            release_details: HashMap::new(),
            tracks: HashMap::new(),
            state: Mutex::new(FakeState::default()),
        }
    }

    fn follow(&mut self, id: &str) {
        self.artists.push(Artist {
            id: id.to_string(),
            name: format!("Artist {id}"),
        });
    }

    /// Publish a release with one track per (track id, name, isrc).
    fn publish(
        &mut self,
        artist_id: &str,
        group: ReleaseGroup,
        release_id: &str,
        date: &str,
        tracks: &[(&str, &str, &str)],
    ) {
        self.releases
            .entry((artist_id.to_string(), group))
            .or_default()
            .push(ReleaseSummary {
                id: release_id.to_string(),
                name: format!("Release {release_id}"),
                release_date: date.to_string(),
            });
        let refs = tracks
            .iter()
            .enumerate()
            .map(|(i, (id, name, isrc))| {
                let track = make_track(id, name, isrc, i as u32 + 1);
                self.tracks.insert(id.to_string(), track.clone());
                TrackRef {
                    id: track.id,
                    uri: track.uri,
                    name: track.name,
                    artists: track.artists,
                    track_number: track.track_number,
                }
            })
            .collect();
        self.release_details.insert(
            release_id.to_string(),
            Release {
                id: release_id.to_string(),
                name: format!("Release {release_id}"),
                release_date: date.to_string(),
                tracks: refs,
            },
        );
    }

    fn seed_playlist(&self, track: Track, added_at: DateTime<Utc>) {
        self.state.lock().unwrap().playlist.push(PlaylistEntry {
            item: PlaylistItem::Track(track),
            added_at: Some(added_at),
        });
    }

    fn playlist_uris(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .playlist
            .iter()
            .filter_map(|e| e.item.as_track().map(|t| t.uri.clone()))
            .collect()
    }
}

fn make_track(id: &str, name: &str, isrc: &str, number: u32) -> Track {
    Track {
        id: id.to_string(),
        uri: format!("spotify:track:{id}"),
        name: name.to_string(),
        artists: vec![Artist {
            id: "main".into(),
            name: "Main Artist".into(),
        }],
        external_id: Some(isrc.to_string()),
        track_number: number,
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        message: format!("{what} not found"),
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn followed_artists(
        &self,
        after: Option<String>,
        limit: u32,
    ) -> Result<Page<Artist, String>, ApiError> {
        let start = match after {
            Some(after) => self
                .artists
                .iter()
                .position(|a| a.id == after)
                .map_or(self.artists.len(), |i| i + 1),
            None => 0,
        };
        let items: Vec<Artist> = self
            .artists
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        let next = if start + items.len() < self.artists.len() {
            items.last().map(|a| a.id.clone())
        } else {
            None
        };
        Ok(Page { items, next })
    }

    async fn artist_releases(
        &self,
        artist_id: &str,
        group: ReleaseGroup,
        limit: u32,
    ) -> Result<Vec<ReleaseSummary>, ApiError> {
        if self.state.lock().unwrap().fail_releases_for.iter().any(|id| id == artist_id) {
            return Err(ApiError::Transport("connection reset".into()));
        }
        Ok(self
            .releases
            .get(&(artist_id.to_string(), group))
            .map(|r| r.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn release(&self, release_id: &str) -> Result<Release, ApiError> {
        self.release_details
            .get(release_id)
            .cloned()
            .ok_or_else(|| not_found("release"))
    }

    async fn track(&self, track_id: &str) -> Result<Track, ApiError> {
        self.state
            .lock()
            .unwrap()
            .track_fetches
            .push(track_id.to_string());
        self.tracks
            .get(track_id)
            .cloned()
            .ok_or_else(|| not_found("track"))
    }

    async fn playlist_items(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<PlaylistEntry, u32>, ApiError> {
        assert_eq!(playlist_id, PLAYLIST);
        let mut state = self.state.lock().unwrap();
        state.playlist_reads += 1;
        if state.fail_playlist_read_on_call == Some(state.playlist_reads) {
            return Err(ApiError::Status {
                status: 503,
                message: "Service unavailable".into(),
            });
        }
        let start = offset as usize;
        let items: Vec<PlaylistEntry> = state
            .playlist
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        let next = (start + (limit as usize) < state.playlist.len()).then(|| offset + limit);
        Ok(Page { items, next })
    }

    async fn add_items(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError> {
        assert_eq!(playlist_id, PLAYLIST);
        let added_at = self.clock.now();
        let mut state = self.state.lock().unwrap();
        state.add_calls += 1;
        if state.fail_add_on_call == Some(state.add_calls) {
            return Err(ApiError::Status {
                status: 429,
                message: "API rate limit exceeded".into(),
            });
        }
        for uri in uris {
            let track = self
                .tracks
                .values()
                .find(|t| &t.uri == uri)
                .cloned()
                .ok_or_else(|| not_found("track"))?;
            state.playlist.push(PlaylistEntry {
                item: PlaylistItem::Track(track),
                added_at: Some(added_at),
            });
        }
        Ok(())
    }

    async fn remove_items(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError> {
        assert_eq!(playlist_id, PLAYLIST);
        assert!(uris.len() <= 100, "remove endpoint accepts at most 100 uris");
        let mut state = self.state.lock().unwrap();
        state.remove_calls.push(uris.len());
        state
            .playlist
            .retain(|e| e.item.as_track().map_or(true, |t| !uris.contains(&t.uri)));
        Ok(())
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 17, 6, 0, 0).unwrap()
}

fn config() -> SynchroniseConfig {
    SynchroniseConfig {
        playlist_id: PLAYLIST.to_string(),
        eviction_days: 7,
        pacing: PacingConfig::default(),
    }
}

#[tokio::test]
async fn full_cycle_evicts_discovers_and_merges() {
    let clock = Arc::new(ManualClock::new(now()));
    let mut catalog = FakeCatalog::new(clock.clone());
    catalog.follow("a");
    catalog.follow("b");
    catalog.follow("c");
    catalog.publish("a", ReleaseGroup::Album, "album-a", "2024-05-17", &[
        ("a1", "Opener", "ISRC-A1"),
        ("a2", "Closer", "ISRC-A2"),
    ]);
    catalog.publish("b", ReleaseGroup::Single, "single-b", "2024-05-17", &[
        ("b1", "Hit", "ISRC-B1"),
        ("b2", "Hit - Extended Mix", "ISRC-B2"),
    ]);
    catalog.publish("c", ReleaseGroup::Album, "album-c", "2024-05-01", &[("c1", "Old", "ISRC-C1")]);

    catalog.seed_playlist(make_track("old", "Old", "ISRC-OLD", 1), now() - ChronoDuration::days(10));
    catalog.seed_playlist(make_track("mid", "Mid", "ISRC-MID", 1), now() - ChronoDuration::days(5));
    // A regional variant of b1 already in the playlist since yesterday.
    catalog.seed_playlist(make_track("b1-regional", "Hit", "ISRC-B1", 1), now() - ChronoDuration::days(1));

    let report = synchronise(&config(), &catalog, &*clock).await;

    assert!(report.is_clean(), "report: {report:?}");
    assert_eq!(report.initial_read.entries, 3);
    assert_eq!(report.removal.removed, 1);
    assert_eq!(report.followed_artists.entries, 3);
    assert_eq!(report.candidates, 3);
    assert_eq!(report.refreshed_read.entries, 2);

    let added: Vec<_> = report.merge.added.iter().map(|t| t.uri.as_str()).collect();
    assert_eq!(added, vec!["spotify:track:a1", "spotify:track:a2"]);
    assert_eq!(report.merge.already_present.len(), 1);
    assert_eq!(report.merge.already_present[0].uri, "spotify:track:b1");

    assert_eq!(
        catalog.playlist_uris(),
        vec![
            "spotify:track:mid",
            "spotify:track:b1-regional",
            "spotify:track:a1",
            "spotify:track:a2",
        ]
    );
    let fetched = catalog.state.lock().unwrap().track_fetches.clone();
    assert!(!fetched.contains(&"b2".to_string()), "extended mix must not be fetched");

    // One second before each append.
    let add_pauses = clock
        .sleeps()
        .iter()
        .filter(|d| **d == Duration::from_secs(1))
        .count();
    assert_eq!(add_pauses, 2);
}

#[tokio::test]
async fn second_cycle_adds_nothing() {
    let clock = Arc::new(ManualClock::new(now()));
    let mut catalog = FakeCatalog::new(clock.clone());
    catalog.follow("a");
    catalog.publish("a", ReleaseGroup::Single, "single-a", "2024-05-17", &[("a1", "Hit", "ISRC-A1")]);

    let first = synchronise(&config(), &catalog, &*clock).await;
    let after_first = catalog.playlist_uris();
    let second = synchronise(&config(), &catalog, &*clock).await;

    assert_eq!(first.merge.added.len(), 1);
    assert!(second.merge.added.is_empty());
    assert_eq!(second.merge.already_present.len(), 1);
    assert_eq!(second.removal.removed, 0);
    assert_eq!(catalog.playlist_uris(), after_first);
}

#[tokio::test]
async fn nothing_released_today_means_no_candidates() {
    let clock = Arc::new(ManualClock::new(now()));
    let mut catalog = FakeCatalog::new(clock.clone());
    catalog.follow("a");
    catalog.publish("a", ReleaseGroup::Album, "album-a", "2024-05-16", &[("a1", "Song", "ISRC-A1")]);
    catalog.publish("a", ReleaseGroup::Single, "single-a", "2024", &[("a2", "Song", "ISRC-A2")]);

    let report = synchronise(&config(), &catalog, &*clock).await;

    assert_eq!(report.candidates, 0);
    assert!(report.merge.added.is_empty());
    assert!(catalog.state.lock().unwrap().track_fetches.is_empty());
}

#[tokio::test]
async fn failed_append_aborts_remaining_additions() {
    let clock = Arc::new(ManualClock::new(now()));
    let mut catalog = FakeCatalog::new(clock.clone());
    catalog.follow("a");
    catalog.publish("a", ReleaseGroup::Album, "album-a", "2024-05-17", &[
        ("a1", "One", "ISRC-1"),
        ("a2", "Two", "ISRC-2"),
        ("a3", "Three", "ISRC-3"),
    ]);
    catalog.state.lock().unwrap().fail_add_on_call = Some(2);

    let report = synchronise(&config(), &catalog, &*clock).await;

    assert!(!report.is_clean());
    assert_eq!(report.merge.added.len(), 1);
    assert_eq!(report.merge.not_attempted, 1);
    assert!(matches!(report.merge.error, Some(ApiError::Status { status: 429, .. })));
    assert_eq!(catalog.state.lock().unwrap().add_calls, 2);
    assert_eq!(catalog.playlist_uris(), vec!["spotify:track:a1"]);
}

#[tokio::test]
async fn large_eviction_is_split_into_batches_of_100() {
    let clock = Arc::new(ManualClock::new(now()));
    let catalog = FakeCatalog::new(clock.clone());
    for i in 0..250 {
        catalog.seed_playlist(
            make_track(&format!("old{i}"), "Old", &format!("ISRC-OLD{i}"), 1),
            now() - ChronoDuration::days(30),
        );
    }

    let report = synchronise(&config(), &catalog, &*clock).await;

    assert_eq!(report.initial_read.entries, 250);
    assert_eq!(report.initial_read.pages, 3);
    assert_eq!(catalog.state.lock().unwrap().remove_calls, vec![100, 100, 50]);
    assert_eq!(report.removal.removed, 250);
    assert!(catalog.playlist_uris().is_empty());
}

#[tokio::test]
async fn failed_re_read_skips_all_additions() {
    let clock = Arc::new(ManualClock::new(now()));
    let mut catalog = FakeCatalog::new(clock.clone());
    catalog.follow("a");
    catalog.publish("a", ReleaseGroup::Album, "album-a", "2024-05-17", &[
        ("a1", "One", "ISRC-1"),
        ("a2", "Two", "ISRC-2"),
    ]);
    // Already in the playlist from an earlier run.
    catalog.seed_playlist(make_track("a1-old", "One", "ISRC-1", 1), now() - ChronoDuration::days(1));
    // The initial read is call 1, the re-read call 2.
    catalog.state.lock().unwrap().fail_playlist_read_on_call = Some(2);

    let report = synchronise(&config(), &catalog, &*clock).await;

    assert!(!report.is_clean());
    assert_eq!(report.candidates, 2);
    assert_eq!(report.refreshed_read.pages, 0);
    assert!(matches!(report.refreshed_read.error, Some(ApiError::Status { status: 503, .. })));
    assert!(report.merge.added.is_empty());
    assert_eq!(report.merge.not_attempted, 2);
    assert_eq!(catalog.state.lock().unwrap().add_calls, 0);
    assert_eq!(catalog.playlist_uris(), vec!["spotify:track:a1-old"]);
}

#[tokio::test]
async fn failed_release_lookups_are_counted_on_the_report() {
    let clock = Arc::new(ManualClock::new(now()));
    let mut catalog = FakeCatalog::new(clock.clone());
    catalog.follow("broken");
    catalog.follow("b");
    catalog.publish("b", ReleaseGroup::Single, "single-b", "2024-05-17", &[("b1", "Hit", "ISRC-B1")]);
    catalog.state.lock().unwrap().fail_releases_for = vec!["broken".to_string()];

    let report = synchronise(&config(), &catalog, &*clock).await;

    assert_eq!(report.failed_categories, 2);
    assert!(!report.is_clean());
    assert_eq!(report.scan.len(), 2);
    assert_eq!(report.merge.added.len(), 1);
    assert_eq!(catalog.playlist_uris(), vec!["spotify:track:b1"]);
}
