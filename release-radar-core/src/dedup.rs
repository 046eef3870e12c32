//! Track identity by external id.
//!
//! Names and URIs differ between regional variants of the same recording, so the external id
//! (ISRC) is the only key used to decide whether two tracks are the same.

use std::collections::HashSet;

use serde::Serialize;

use crate::contract::{PlaylistEntry, Track};

/// Identity of a track for deduplication. Two tracks are duplicates iff both have a key and
/// the keys are equal; a track without one matches nothing.
pub fn dedup_key(track: &Track) -> Option<&str> {
    track.external_id.as_deref()
}

/// Result of offering a track to a [`CandidateSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Admission {
    Added,
    Duplicate,
    /// Without an external id the track cannot be deduplicated, so it is refused.
    MissingExternalId,
}

/// Ordered tracks discovered during one scan, pairwise distinct by external id.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    tracks: Vec<Track>,
    seen: HashSet<String>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, track: Track) -> Admission {
        let Some(key) = dedup_key(&track) else {
            return Admission::MissingExternalId;
        };
        if !self.seen.insert(key.to_string()) {
            return Admission::Duplicate;
        }
        self.tracks.push(track);
        Admission::Added
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks in discovery order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }
}

/// External ids of the tracks currently in a playlist.
///
/// Only track rows count; episodes and unavailable items carry no external id and are ignored.
#[derive(Debug, Clone, Default)]
pub struct PlaylistIndex {
    external_ids: HashSet<String>,
}

impl PlaylistIndex {
    pub fn from_entries(entries: &[PlaylistEntry]) -> Self {
        let external_ids = entries
            .iter()
            .filter_map(|entry| entry.item.as_track())
            .filter_map(dedup_key)
            .map(str::to_string)
            .collect();
        Self { external_ids }
    }

    pub fn contains(&self, track: &Track) -> bool {
        dedup_key(track).is_some_and(|key| self.external_ids.contains(key))
    }

    /// Record a track added during this run.
    pub fn insert(&mut self, track: &Track) {
        if let Some(key) = dedup_key(track) {
            self.external_ids.insert(key.to_string());
        }
    }
}
