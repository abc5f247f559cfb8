// SPDX-License-Identifier: GPL-3.0-or-later

//! MusicBrainz recording search used to canonicalize track metadata before
//! catalog lookups. Requests are serialized through a rate limiter that keeps
//! to the public API's one-request-per-second guideline.

pub mod client;
#[cfg(test)]
mod client_tests;
pub mod error;
pub mod models;
pub mod rate_limiter;

pub use client::{clean_query_term, escape_lucene, MusicBrainzClient, MusicBrainzClientBuilder};
pub use error::{MusicBrainzError, Result};
pub use models::{
    ArtistCredit, ArtistRef, Recording, RecordingSearchResult, ReleaseRef, ResolvedRecording,
    SearchQuery, SearchResponse,
};
pub use rate_limiter::RateLimiter;
