//! Cursor/offset pagination over the remote service.
//!
//! [`fetch_all`] drives any page-fetching closure until the service stops handing out a
//! next cursor, keeping items in exactly the order they were served. A failed page ends the
//! loop; the caller gets the items gathered so far together with the error.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::contract::{ApiError, Artist, CatalogApi, Page, PlaylistEntry};
use crate::pacing::RateLimiter;

/// Largest page the playlist items endpoint serves.
pub const PLAYLIST_PAGE_LIMIT: u32 = 100;
/// Largest page the followed artists endpoint serves.
pub const FOLLOWED_ARTISTS_PAGE_LIMIT: u32 = 50;

/// Accumulated result of a pagination loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    /// Pages successfully fetched.
    pub pages: usize,
    /// The failure that ended the loop early, if any.
    pub error: Option<ApiError>,
}

impl<T> Paginated<T> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Fetch every page, starting with cursor `None`, pausing `delay` between pages.
pub async fn fetch_all<T, C, F, Fut>(
    limiter: &RateLimiter<'_>,
    delay: Duration,
    mut fetch_page: F,
) -> Paginated<T>
where
    F: FnMut(Option<C>) -> Fut,
    Fut: Future<Output = Result<Page<T, C>, ApiError>>,
{
    let mut items = Vec::new();
    let mut pages = 0;
    let mut cursor = None;

    loop {
        let page = match fetch_page(cursor.take()).await {
            Ok(page) => page,
            Err(e) => {
                error!(error = %e, pages, items = items.len(), "[PAGE] Page request failed, keeping partial result");
                return Paginated {
                    items,
                    pages,
                    error: Some(e),
                };
            }
        };
        pages += 1;
        debug!(page = pages, items = page.items.len(), "[PAGE] Fetched page");
        items.extend(page.items);

        match page.next {
            Some(next) => {
                cursor = Some(next);
                limiter.pause(delay).await;
            }
            None => break,
        }
    }

    Paginated {
        items,
        pages,
        error: None,
    }
}

/// All rows of the playlist, in playlist order.
pub async fn fetch_playlist<A>(
    api: &A,
    limiter: &RateLimiter<'_>,
    playlist_id: &str,
    delay: Duration,
) -> Paginated<PlaylistEntry>
where
    A: CatalogApi + ?Sized,
{
    let result = fetch_all(limiter, delay, move |offset: Option<u32>| {
        api.playlist_items(playlist_id, offset.unwrap_or(0), PLAYLIST_PAGE_LIMIT)
    })
    .await;
    info!(
        playlist_id,
        entries = result.items.len(),
        pages = result.pages,
        complete = result.is_complete(),
        "[PAGE] Read playlist"
    );
    result
}

/// Every artist the current user follows, in service order.
pub async fn fetch_followed_artists<A>(
    api: &A,
    limiter: &RateLimiter<'_>,
    delay: Duration,
) -> Paginated<Artist>
where
    A: CatalogApi + ?Sized,
{
    let result = fetch_all(limiter, delay, move |after: Option<String>| {
        api.followed_artists(after, FOLLOWED_ARTISTS_PAGE_LIMIT)
    })
    .await;
    info!(
        artists = result.items.len(),
        pages = result.pages,
        complete = result.is_complete(),
        "[PAGE] Read followed artists"
    );
    result
}
