//! Discovery of today's releases for each followed artist.
//!
//! For every artist the scanner looks at the latest album and the latest single. A release
//! counts only when its day-precision release date equals the current UTC date; such a release
//! is expanded track by track into the shared [`CandidateSet`].
//!
//! Each artist/category pair fails on its own: an API error abandons that category for that
//! artist, is recorded as [`CategoryOutcome::Failed`], and scanning moves on.

use chrono::NaiveDate;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::contract::{ApiError, Artist, CatalogApi, ReleaseGroup, ReleaseSummary};
use crate::dedup::{Admission, CandidateSet};
use crate::pacing::{RateLimiter, RequestBudget};

/// How many recent releases of one group are inspected per artist.
pub const RELEASE_LIMIT: u32 = 10;

/// Singles tracks whose name contains this marker are extended mixes and are left out.
pub const EXTENDED_MIX_MARKER: &str = "- Extended";

const RELEASE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a day-precision release date. Year or month precision dates yield `None`.
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, RELEASE_DATE_FORMAT).ok()
}

/// A release together with its parsed date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatedRelease {
    pub release: ReleaseSummary,
    pub date: NaiveDate,
}

/// Keep only releases with a parsable date, in input order.
pub fn dated_releases(releases: &[ReleaseSummary]) -> Vec<DatedRelease> {
    releases
        .iter()
        .filter_map(|release| {
            parse_release_date(&release.release_date).map(|date| DatedRelease {
                release: release.clone(),
                date,
            })
        })
        .collect()
}

/// The most recent dated release. On equal dates the first in input order wins.
pub fn latest_release(releases: &[ReleaseSummary]) -> Option<DatedRelease> {
    dated_releases(releases)
        .into_iter()
        .fold(None, |best: Option<DatedRelease>, candidate| match best {
            Some(best) if best.date >= candidate.date => Some(best),
            _ => Some(candidate),
        })
}

pub fn is_extended_mix(track_name: &str) -> bool {
    track_name.contains(EXTENDED_MIX_MARKER)
}

/// What happened to one track of a release released today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackDecision {
    Added,
    /// Another candidate already has the same external id.
    Duplicate,
    MissingExternalId,
    /// Extended mix on a single; never fetched.
    ExtendedMix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackReport {
    pub track_number: u32,
    pub name: String,
    pub artists: String,
    pub decision: TrackDecision,
}

/// Result of scanning one release group for one artist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CategoryOutcome {
    NoReleases,
    NotToday {
        release: ReleaseSummary,
        date: NaiveDate,
    },
    Expanded {
        release: ReleaseSummary,
        date: NaiveDate,
        tracks: Vec<TrackReport>,
    },
    /// The category was abandoned. `tracks` lists what was decided before the failure.
    Failed {
        #[serde(skip)]
        error: ApiError,
        tracks: Vec<TrackReport>,
    },
}

impl CategoryOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, CategoryOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistScanReport {
    pub artist: Artist,
    pub album: CategoryOutcome,
    pub single: CategoryOutcome,
    /// Requests issued for this artist.
    pub requests: u32,
    /// Time slept afterwards to respect the request budget.
    pub waited: Duration,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub candidates: CandidateSet,
    pub artists: Vec<ArtistScanReport>,
}

impl ScanReport {
    /// Number of artist/category pairs abandoned because of a request failure.
    pub fn failed_categories(&self) -> usize {
        self.artists
            .iter()
            .map(|a| usize::from(a.album.is_failed()) + usize::from(a.single.is_failed()))
            .sum()
    }
}

/// Scans followed artists for releases dated today.
pub struct ReleaseScanner<'a, A: ?Sized> {
    api: &'a A,
    limiter: RateLimiter<'a>,
    budget: RequestBudget,
}

impl<'a, A> ReleaseScanner<'a, A>
where
    A: CatalogApi + ?Sized,
{
    pub fn new(api: &'a A, limiter: RateLimiter<'a>, budget: RequestBudget) -> Self {
        Self {
            api,
            limiter,
            budget,
        }
    }

    /// Scan every artist in order, accumulating one candidate set for the whole run.
    pub async fn scan_all(&self, artists: &[Artist]) -> ScanReport {
        let today = self.limiter.now().date_naive();
        let mut candidates = CandidateSet::new();
        let mut reports = Vec::with_capacity(artists.len());

        info!(artists = artists.len(), %today, "[SCAN] Looking for releases dated today");
        for (i, artist) in artists.iter().enumerate() {
            info!(
                "[SCAN] [{}/{}] [{}] {}:",
                i + 1,
                artists.len(),
                artist.id,
                artist.name
            );
            reports.push(self.scan_artist(artist, today, &mut candidates).await);
        }

        let report = ScanReport {
            candidates,
            artists: reports,
        };
        info!(
            candidates = report.candidates.len(),
            failed_categories = report.failed_categories(),
            "[SCAN] Scan finished"
        );
        report
    }

    /// Scan the album and single groups of one artist, then wait out the artist's request budget.
    pub async fn scan_artist(
        &self,
        artist: &Artist,
        today: NaiveDate,
        candidates: &mut CandidateSet,
    ) -> ArtistScanReport {
        // The budget window is measured per artist.
        let watch = self.limiter.start();
        let mut requests = 0;

        let album = self
            .scan_category(artist, ReleaseGroup::Album, today, candidates, &mut requests)
            .await;
        let single = self
            .scan_category(artist, ReleaseGroup::Single, today, candidates, &mut requests)
            .await;

        let waited = self.limiter.pace(&watch, self.budget, requests).await;

        ArtistScanReport {
            artist: artist.clone(),
            album,
            single,
            requests,
            waited,
        }
    }

    async fn scan_category(
        &self,
        artist: &Artist,
        group: ReleaseGroup,
        today: NaiveDate,
        candidates: &mut CandidateSet,
        requests: &mut u32,
    ) -> CategoryOutcome {
        let mut tracks = Vec::new();
        match self
            .expand_latest(artist, group, today, candidates, requests, &mut tracks)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                error!(
                    artist_id = %artist.id,
                    group = %group,
                    error = %error,
                    "[SCAN][ERROR] Request failed, skipping this release group for the artist"
                );
                CategoryOutcome::Failed { error, tracks }
            }
        }
    }

    async fn expand_latest(
        &self,
        artist: &Artist,
        group: ReleaseGroup,
        today: NaiveDate,
        candidates: &mut CandidateSet,
        requests: &mut u32,
        tracks: &mut Vec<TrackReport>,
    ) -> Result<CategoryOutcome, ApiError> {
        *requests += 1;
        let releases = self
            .api
            .artist_releases(&artist.id, group, RELEASE_LIMIT)
            .await?;

        let Some(latest) = latest_release(&releases) else {
            info!(group = %group, "[SCAN]   No {}s found for artist.", group);
            return Ok(CategoryOutcome::NoReleases);
        };

        info!(
            group = %group,
            today = latest.date == today,
            "[SCAN]   Latest {}: [{}] {}",
            group,
            latest.date,
            latest.release.name
        );
        if latest.date != today {
            return Ok(CategoryOutcome::NotToday {
                release: latest.release,
                date: latest.date,
            });
        }

        *requests += 1;
        let release = self.api.release(&latest.release.id).await?;

        for track_ref in &release.tracks {
            let decision = if group == ReleaseGroup::Single && is_extended_mix(&track_ref.name) {
                TrackDecision::ExtendedMix
            } else {
                *requests += 1;
                let track = self.api.track(&track_ref.id).await?;
                match candidates.insert(track) {
                    Admission::Added => TrackDecision::Added,
                    Admission::Duplicate => TrackDecision::Duplicate,
                    Admission::MissingExternalId => {
                        warn!(track_id = %track_ref.id, "[SCAN] Track has no external id, cannot deduplicate");
                        TrackDecision::MissingExternalId
                    }
                }
            };

            let report = TrackReport {
                track_number: track_ref.track_number,
                name: track_ref.name.clone(),
                artists: track_ref.artist_names(),
                decision,
            };
            let verb = if decision == TrackDecision::Added {
                "Added"
            } else {
                "Skipped"
            };
            info!(
                ?decision,
                "[SCAN]     {}: [{}] {} - {}",
                verb,
                report.track_number,
                report.artists,
                report.name
            );
            tracks.push(report);
        }

        Ok(CategoryOutcome::Expanded {
            release: latest.release,
            date: latest.date,
            tracks: std::mem::take(tracks),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, date: &str) -> ReleaseSummary {
        ReleaseSummary {
            id: id.to_string(),
            name: format!("Release {id}"),
            release_date: date.to_string(),
        }
    }

    #[test]
    fn parses_only_day_precision_dates() {
        assert_eq!(
            parse_release_date("2024-05-17"),
            NaiveDate::from_ymd_opt(2024, 5, 17)
        );
        assert_eq!(parse_release_date("2024"), None);
        assert_eq!(parse_release_date("2024-05"), None);
        assert_eq!(parse_release_date("2024-5-7"), None);
        assert_eq!(parse_release_date("2024-02-30"), None);
        assert_eq!(parse_release_date(""), None);
    }

    #[test]
    fn latest_release_ignores_unparsable_dates() {
        let releases = vec![
            summary("year-only", "2030"),
            summary("old", "2023-01-01"),
            summary("month-only", "2031-12"),
            summary("new", "2024-05-17"),
        ];

        let latest = latest_release(&releases).expect("a dated release");
        assert_eq!(latest.release.id, "new");
        assert_eq!(latest.date, NaiveDate::from_ymd_opt(2024, 5, 17).unwrap());
    }

    #[test]
    fn latest_release_prefers_first_on_equal_dates() {
        let releases = vec![
            summary("older", "2024-05-01"),
            summary("first", "2024-05-17"),
            summary("second", "2024-05-17"),
        ];
        assert_eq!(latest_release(&releases).unwrap().release.id, "first");
    }

    #[test]
    fn latest_release_is_none_without_dated_releases() {
        assert!(latest_release(&[]).is_none());
        assert!(latest_release(&[summary("a", "2024"), summary("b", "bogus")]).is_none());
    }

    #[test]
    fn extended_mix_marker_is_a_substring_match() {
        assert!(is_extended_mix("Song Title - Extended Mix"));
        assert!(is_extended_mix("Song Title - Extended"));
        assert!(!is_extended_mix("Song Title (Extended Mix)"));
        assert!(!is_extended_mix("Song Title - Radio Edit"));
    }
}
