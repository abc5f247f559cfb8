// SPDX-License-Identifier: GPL-3.0-or-later

#[cfg(test)]
mod tests {
    use crate::{clean_query_term, escape_lucene, MusicBrainzClient, MusicBrainzError, SearchQuery};
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RADIOHEAD_MBID: &str = "a74b1b7f-71a5-4011-9441-d0b5e4122711";
    const PARANOID_ANDROID_MBID: &str = "e5a3f0c4-1fae-4f2e-8f76-0c3b4f1e4fa6";

    fn client_for(server: &MockServer) -> MusicBrainzClient {
        MusicBrainzClient::builder()
            .base_url(server.uri())
            .rate_limit_interval(Duration::ZERO)
            .build()
            .unwrap()
    }

    fn recording_search_response() -> serde_json::Value {
        serde_json::json!({
            "created": "2026-01-08T12:00:00.000Z",
            "count": 1,
            "offset": 0,
            "recordings": [{
                "id": PARANOID_ANDROID_MBID,
                "title": "Paranoid Android",
                "length": 387000,
                "score": 100,
                "artist-credit": [{
                    "name": "Radiohead",
                    "artist": { "id": RADIOHEAD_MBID, "name": "Radiohead" }
                }],
                "releases": [{ "id": "rel-1", "title": "OK Computer", "date": "1997-05-21" }],
                "isrcs": ["GBAYE9700105"]
            }]
        })
    }

    fn empty_search_response() -> serde_json::Value {
        serde_json::json!({
            "created": "2026-01-08T12:00:00.000Z",
            "count": 0,
            "offset": 0,
            "recordings": []
        })
    }

    #[test]
    fn clean_query_term_strips_decorations() {
        assert_eq!(clean_query_term("Paranoid Android (Remastered)"), "Paranoid Android");
        assert_eq!(clean_query_term("Song [Live] - 2011 Mix"), "Song");
        assert_eq!(clean_query_term("Creep - Acoustic"), "Creep");
        assert_eq!(clean_query_term("Radiohead, Thom Yorke"), "Radiohead");
        assert_eq!(clean_query_term("  Plain  "), "Plain");
    }

    #[test]
    fn escape_lucene_prefixes_special_characters() {
        assert_eq!(escape_lucene("AC/DC"), "AC\\/DC");
        assert_eq!(escape_lucene("What?"), "What\\?");
        assert_eq!(escape_lucene("a && b"), "a \\&\\& b");
        assert_eq!(escape_lucene("plain words"), "plain words");
    }

    #[tokio::test]
    async fn search_recordings_passes_query_and_paging() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/recording"))
            .and(query_param("query", "recording:(Creep)"))
            .and(query_param("fmt", "json"))
            .and(query_param("limit", "5"))
            .and(query_param("offset", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(recording_search_response()))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server)
            .search_recordings(SearchQuery::new("recording:(Creep)").limit(5).offset(10))
            .await
            .unwrap();

        assert_eq!(response.count, 1);
        assert_eq!(response.results.recordings[0].title, "Paranoid Android");
    }

    #[tokio::test]
    async fn resolve_recording_uses_combined_query_first() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/recording"))
            .and(query_param(
                "query",
                "recording:(Paranoid Android) AND artist:(Radiohead)",
            ))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(recording_search_response()))
            .expect(1)
            .mount(&server)
            .await;

        let resolved = client_for(&server)
            .resolve_recording("Paranoid Android (Remastered)", "Radiohead")
            .await
            .unwrap()
            .expect("recording should resolve");

        assert_eq!(resolved.title, "Paranoid Android");
        assert_eq!(resolved.artist, "Radiohead");
        assert_eq!(resolved.album.as_deref(), Some("OK Computer"));
        assert_eq!(resolved.length_ms, Some(387000));
        assert_eq!(resolved.isrc.as_deref(), Some("GBAYE9700105"));
    }

    #[tokio::test]
    async fn resolve_recording_falls_back_to_title_only() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/recording"))
            .and(query_param(
                "query",
                "recording:(Paranoid Android) AND artist:(Unknown Band)",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_search_response()))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/recording"))
            .and(query_param("query", "recording:(Paranoid Android)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(recording_search_response()))
            .expect(1)
            .mount(&server)
            .await;

        let resolved = client_for(&server)
            .resolve_recording("Paranoid Android", "Unknown Band")
            .await
            .unwrap();

        assert_eq!(resolved.map(|r| r.mbid), Some(PARANOID_ANDROID_MBID.to_string()));
    }

    #[tokio::test]
    async fn resolve_recording_returns_none_when_nothing_matches() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/recording"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_search_response()))
            .expect(2)
            .mount(&server)
            .await;

        let resolved = client_for(&server)
            .resolve_recording("Nonexistent", "Nobody")
            .await
            .unwrap();

        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn service_unavailable_maps_to_rate_limit() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/recording"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .resolve_recording("Creep", "Radiohead")
            .await
            .unwrap_err();

        assert!(matches!(err, MusicBrainzError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/recording"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad query"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .search_recordings(SearchQuery::new("recording:("))
            .await
            .unwrap_err();

        match err {
            MusicBrainzError::ApiError { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad query");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/recording"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .search_recordings(SearchQuery::new("recording:(x)"))
            .await
            .unwrap_err();

        assert!(matches!(err, MusicBrainzError::InvalidResponse(_)));
    }
}
