// SPDX-License-Identifier: GPL-3.0-or-later
use async_trait::async_trait;
use tunebridge_domain::SourceTrack;
use tunebridge_musicbrainz::{MusicBrainzClient, ResolvedRecording};

use crate::transfer::MetadataResolver;

/// Canonical metadata from MusicBrainz recording search.
pub struct MusicBrainzResolver {
    client: MusicBrainzClient,
}

impl MusicBrainzResolver {
    pub fn new(client: MusicBrainzClient) -> Self {
        Self { client }
    }
}

fn to_source_track(recording: ResolvedRecording) -> SourceTrack {
    SourceTrack {
        title: recording.title,
        artist: recording.artist,
        album_title: recording.album,
        isrc: recording.isrc,
        duration_ms: recording.length_ms,
        source_id: Some(recording.mbid),
        ..SourceTrack::default()
    }
}

#[async_trait]
impl MetadataResolver for MusicBrainzResolver {
    async fn resolve(&self, title: &str, artist: &str) -> anyhow::Result<Option<SourceTrack>> {
        let resolved = self.client.resolve_recording(title, artist).await?;
        Ok(resolved.map(to_source_track))
    }
}
