//! Spotify Web API implementation of [`CatalogApi`].
//!
//! The wire types below mirror the JSON Spotify returns and are converted into the core
//! contract types right after decoding. Each trait method issues exactly one request.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use release_radar_core::contract::{
    ApiError, Artist, CatalogApi, Page, PlaylistEntry, PlaylistItem, Release, ReleaseGroup,
    ReleaseSummary, Track, TrackRef,
};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
pub const API_BASE_ENV: &str = "SPOTIFY_API_BASE";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Spotify Web API client authenticated with a user access token.
pub struct SpotifyClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl SpotifyClient {
    pub fn new(access_token: String, base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            access_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Client against `SPOTIFY_API_BASE`, or the public API when it is unset.
    pub fn from_env(access_token: String) -> Result<Self, reqwest::Error> {
        let base_url = std::env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(access_token, base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String, ApiError> {
        debug!(path, "GET");
        let response = send(self.request(Method::GET, path).query(query)).await?;
        response.text().await.map_err(transport_error)
    }
}

async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), &body))
}

fn transport_error(e: reqwest::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}

pub(crate) fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorObject,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    message: Option<String>,
}

/// Map a non-success response to [`ApiError::Status`], keeping Spotify's message when present.
pub(crate) fn status_error(status: u16, body: &str) -> ApiError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| body.trim().to_string());
    ApiError::Status { status, message }
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    id: Option<String>,
    name: String,
}

impl From<ArtistObject> for Artist {
    fn from(artist: ArtistObject) -> Self {
        Artist {
            id: artist.id.unwrap_or_default(),
            name: artist.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FollowedArtistsBody {
    artists: CursorPaging<ArtistObject>,
}

#[derive(Debug, Deserialize)]
struct CursorPaging<T> {
    items: Vec<T>,
    next: Option<String>,
    cursors: Option<Cursors>,
}

#[derive(Debug, Deserialize)]
struct Cursors {
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimplifiedAlbum {
    id: String,
    name: String,
    release_date: String,
}

#[derive(Debug, Deserialize)]
struct AlbumObject {
    id: String,
    name: String,
    release_date: String,
    tracks: Paging<SimplifiedTrack>,
}

#[derive(Debug, Deserialize)]
struct SimplifiedTrack {
    id: Option<String>,
    uri: String,
    name: String,
    artists: Vec<ArtistObject>,
    track_number: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalIds {
    isrc: Option<String>,
    ean: Option<String>,
    upc: Option<String>,
}

impl ExternalIds {
    /// ISRC when present, falling back to EAN then UPC.
    fn preferred(self) -> Option<String> {
        [self.isrc, self.ean, self.upc]
            .into_iter()
            .flatten()
            .find(|id| !id.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: Option<String>,
    uri: String,
    name: String,
    artists: Vec<ArtistObject>,
    track_number: u32,
    #[serde(default)]
    external_ids: ExternalIds,
}

impl From<TrackObject> for Track {
    fn from(track: TrackObject) -> Self {
        Track {
            id: track.id.unwrap_or_default(),
            uri: track.uri,
            name: track.name,
            artists: track.artists.into_iter().map(Artist::from).collect(),
            external_id: track.external_ids.preferred(),
            track_number: track.track_number,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum PlayableObject {
    Track(TrackObject),
    Episode { uri: Option<String> },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct PlaylistTrackObject {
    added_at: Option<DateTime<Utc>>,
    track: Option<PlayableObject>,
}

impl From<PlaylistTrackObject> for PlaylistEntry {
    fn from(row: PlaylistTrackObject) -> Self {
        let item = match row.track {
            Some(PlayableObject::Track(track)) => PlaylistItem::Track(track.into()),
            Some(PlayableObject::Episode { uri }) => PlaylistItem::Other { uri },
            Some(PlayableObject::Unknown) | None => PlaylistItem::Other { uri: None },
        };
        PlaylistEntry {
            item,
            added_at: row.added_at,
        }
    }
}

pub(crate) fn followed_artists_page(body: &str) -> Result<Page<Artist, String>, ApiError> {
    let page = decode_body::<FollowedArtistsBody>(body)?.artists;
    // The cursor is only meaningful while Spotify reports a next page.
    let next = page.next.and(page.cursors.and_then(|c| c.after));
    Ok(Page {
        items: page.items.into_iter().map(Artist::from).collect(),
        next,
    })
}

pub(crate) fn release_summaries(body: &str) -> Result<Vec<ReleaseSummary>, ApiError> {
    let page: Paging<SimplifiedAlbum> = decode_body(body)?;
    Ok(page
        .items
        .into_iter()
        .map(|album| ReleaseSummary {
            id: album.id,
            name: album.name,
            release_date: album.release_date,
        })
        .collect())
}

pub(crate) fn release_detail(body: &str) -> Result<Release, ApiError> {
    let album: AlbumObject = decode_body(body)?;
    if album.tracks.next.is_some() {
        debug!(release_id = %album.id, "Release has more tracks than the first listing page");
    }
    let tracks = album
        .tracks
        .items
        .into_iter()
        .filter_map(|track| {
            Some(TrackRef {
                id: track.id?,
                uri: track.uri,
                name: track.name,
                artists: track.artists.into_iter().map(Artist::from).collect(),
                track_number: track.track_number,
            })
        })
        .collect();
    Ok(Release {
        id: album.id,
        name: album.name,
        release_date: album.release_date,
        tracks,
    })
}

pub(crate) fn track_detail(body: &str) -> Result<Track, ApiError> {
    decode_body::<TrackObject>(body).map(Track::from)
}

/// Decode one playlist page requested at `offset`; the next cursor is `offset + limit`.
pub(crate) fn playlist_page(body: &str, offset: u32, limit: u32) -> Result<Page<PlaylistEntry, u32>, ApiError> {
    let page: Paging<PlaylistTrackObject> = decode_body(body)?;
    let next = page.next.map(|_| offset + limit);
    Ok(Page {
        items: page.items.into_iter().map(PlaylistEntry::from).collect(),
        next,
    })
}

#[async_trait]
impl CatalogApi for SpotifyClient {
    async fn followed_artists(
        &self,
        after: Option<String>,
        limit: u32,
    ) -> Result<Page<Artist, String>, ApiError> {
        let mut query = vec![("type", "artist".to_string()), ("limit", limit.to_string())];
        if let Some(after) = after {
            query.push(("after", after));
        }
        let body = self.get("/me/following", &query).await?;
        followed_artists_page(&body)
    }

    async fn artist_releases(
        &self,
        artist_id: &str,
        group: ReleaseGroup,
        limit: u32,
    ) -> Result<Vec<ReleaseSummary>, ApiError> {
        let query = [
            ("include_groups", group.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        let body = self.get(&format!("/artists/{artist_id}/albums"), &query).await?;
        release_summaries(&body)
    }

    async fn release(&self, release_id: &str) -> Result<Release, ApiError> {
        let body = self.get(&format!("/albums/{release_id}"), &[]).await?;
        release_detail(&body)
    }

    async fn track(&self, track_id: &str) -> Result<Track, ApiError> {
        let body = self.get(&format!("/tracks/{track_id}"), &[]).await?;
        track_detail(&body)
    }

    async fn playlist_items(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<PlaylistEntry, u32>, ApiError> {
        let path = format!("/playlists/{playlist_id}/tracks");
        let query = [("offset", offset.to_string()), ("limit", limit.to_string())];
        let body = self.get(&path, &query).await?;
        playlist_page(&body, offset, limit)
    }

    async fn add_items(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError> {
        let path = format!("/playlists/{playlist_id}/tracks");
        match send(self.request(Method::POST, &path).json(&json!({ "uris": uris }))).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(playlist_id, error = %e, "Spotify rejected playlist addition");
                Err(e)
            }
        }
    }

    async fn remove_items(&self, playlist_id: &str, uris: &[String]) -> Result<(), ApiError> {
        let path = format!("/playlists/{playlist_id}/tracks");
        let tracks: Vec<_> = uris.iter().map(|uri| json!({ "uri": uri })).collect();
        match send(self.request(Method::DELETE, &path).json(&json!({ "tracks": tracks }))).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(playlist_id, error = %e, "Spotify rejected playlist removal");
                Err(e)
            }
        }
    }
}
