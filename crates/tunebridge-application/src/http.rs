// SPDX-License-Identifier: GPL-3.0-or-later

//! Shared reqwest client construction and the browser-like headers remote
//! media hosts expect.

use reqwest::header::{HeaderMap, HeaderValue, COOKIE, ORIGIN, REFERER, USER_AGENT};
use reqwest::Client;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const YOUTUBE_MUSIC_ORIGIN: &str = "https://music.youtube.com";

pub fn http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .pool_max_idle_per_host(8)
        .user_agent(BROWSER_USER_AGENT)
        .build()
}

/// Headers for fetching a resolved media URL.
///
/// YouTube-hosted media rejects requests without a music.youtube.com origin,
/// and media served from the catalog itself needs the session cookie.
pub fn media_request_headers(
    media_url: &str,
    catalog_base: &str,
    credential: Option<&str>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

    if media_url.contains("youtube.com") || media_url.contains("googlevideo.com") {
        headers.insert(REFERER, HeaderValue::from_static("https://music.youtube.com/"));
        headers.insert(ORIGIN, HeaderValue::from_static(YOUTUBE_MUSIC_ORIGIN));
    }

    if let Some(token) = credential {
        if !catalog_base.is_empty() && media_url.starts_with(catalog_base) {
            if let Ok(value) = HeaderValue::from_str(&format!("session={}", token)) {
                headers.insert(COOKIE, value);
            }
        }
    }

    headers
}

/// `scheme://host[:port]` of a base url.
pub fn origin_of(base: &str) -> Option<String> {
    let url = url::Url::parse(base).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}
