// SPDX-License-Identifier: GPL-3.0-or-later

#[cfg(test)]
mod media_cache_tests {
    use crate::catalog::{CatalogError, StreamResolver};
    use crate::media_cache::{MediaCache, MediaCacheError, MediaCacheSettings, MediaSource};
    use crate::test_support::{temp_files, truncated_body_server};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct BaseResolver(String);

    #[async_trait]
    impl StreamResolver for BaseResolver {
        async fn resolve_stream_url(&self, track_id: &str) -> Result<String, CatalogError> {
            Ok(format!("{}/media/{track_id}", self.0))
        }
    }

    async fn cache(root: &Path, base: &str, budget_bytes: u64) -> MediaCache {
        MediaCache::open(
            Arc::new(BaseResolver(base.to_string())),
            MediaCacheSettings {
                root: root.to_path_buf(),
                budget_bytes,
                catalog_base: "http://catalog.invalid".into(),
                credential: None,
            },
        )
        .await
        .unwrap()
    }

    async fn read_body(source: MediaSource) -> (u16, Vec<u8>) {
        match source {
            MediaSource::Upstream { status, body, .. } => {
                let chunks: Vec<_> = body.collect().await;
                let mut bytes = Vec::new();
                for chunk in chunks {
                    bytes.extend_from_slice(&chunk.unwrap());
                }
                (status, bytes)
            }
            other => panic!("expected upstream relay, got {other:?}"),
        }
    }

    async fn wait_for_file(path: &Path) {
        for _ in 0..200 {
            if path.is_file() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never appeared", path.display());
    }

    async fn wait_for_temp_cleanup(dir: &Path) {
        for _ in 0..200 {
            if temp_files(dir).is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("temp files left behind: {:?}", temp_files(dir));
    }

    fn write_aged(path: &Path, len: usize, age_secs: u64) {
        std::fs::write(path, vec![0u8; len]).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[tokio::test]
    async fn missing_track_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = cache(dir.path(), "http://unused.invalid", 1024).await;

        let err = cache.open_stream(None, None).await.unwrap_err();
        assert!(matches!(err, MediaCacheError::MissingParameter("trackId")));
        let err = cache.open_stream(Some("  "), None).await.unwrap_err();
        assert!(matches!(err, MediaCacheError::MissingParameter(_)));
    }

    #[tokio::test]
    async fn local_path_is_served_directly() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("song.flac");
        std::fs::write(&local, b"local").unwrap();
        let cache = cache(&dir.path().join("cache"), "http://unused.invalid", 1024).await;

        match cache.open_stream(Some("1"), Some(&local)).await.unwrap() {
            MediaSource::File(path) => assert_eq!(path, local),
            other => panic!("unexpected {other:?}"),
        }

        let missing = dir.path().join("gone.flac");
        let err = cache.open_stream(None, Some(&missing)).await.unwrap_err();
        assert!(matches!(err, MediaCacheError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn miss_relays_and_caches_then_hits_from_disk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/flac")
                    .set_body_bytes(b"streamed-audio".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = cache(dir.path(), &server.uri(), 1024 * 1024).await;

        let first = cache.open_stream(Some("42"), None).await.unwrap();
        if let MediaSource::Upstream { headers, .. } = &first {
            assert_eq!(headers.get("content-type").unwrap(), "audio/flac");
        }
        let (status, body) = read_body(first).await;
        assert_eq!(status, 200);
        assert_eq!(body, b"streamed-audio");

        let cached = cache.stream_cache_path("42");
        wait_for_file(&cached).await;
        assert_eq!(std::fs::read(&cached).unwrap(), b"streamed-audio");

        match cache.open_stream(Some("42"), None).await.unwrap() {
            MediaSource::File(path) => assert_eq!(path, cached),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn caching_continues_after_client_disconnects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = cache(dir.path(), &server.uri(), 1024 * 1024).await;

        let source = cache.open_stream(Some("5"), None).await.unwrap();
        drop(source);

        let cached = cache.stream_cache_path("5");
        wait_for_file(&cached).await;
        assert_eq!(std::fs::metadata(&cached).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn concurrent_misses_never_expose_a_partial_file() {
        let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/77"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(payload.clone())
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = cache(dir.path(), &server.uri(), 1024 * 1024).await;
        let target = cache.stream_cache_path("77");

        let watcher = {
            let target = target.clone();
            let expected = payload.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    if let Ok(bytes) = tokio::fs::read(&target).await {
                        assert_eq!(bytes.len(), expected.len(), "cache exposed a partial file");
                        assert!(bytes == expected);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        let (first, second) = tokio::join!(
            cache.open_stream(Some("77"), None),
            cache.open_stream(Some("77"), None)
        );
        let (first_status, first_body) = read_body(first.unwrap()).await;
        let (second_status, second_body) = read_body(second.unwrap()).await;
        assert_eq!((first_status, second_status), (200, 200));
        assert!(first_body == payload);
        assert!(second_body == payload);

        wait_for_file(&target).await;
        wait_for_temp_cleanup(dir.path()).await;
        assert!(std::fs::read(&target).unwrap() == payload);
        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn interrupted_upstream_leaves_no_cache_entry() {
        let base = truncated_body_server(b"partial-audio", 1024 * 1024).await;
        let dir = TempDir::new().unwrap();
        let cache = cache(dir.path(), &base, 4 * 1024 * 1024).await;

        let source = cache.open_stream(Some("31"), None).await.unwrap();
        let MediaSource::Upstream { status, body, .. } = source else {
            panic!("expected upstream relay");
        };
        assert_eq!(status, 200);
        let chunks: Vec<_> = body.collect().await;
        assert!(chunks.iter().any(|chunk| chunk.is_err()));

        wait_for_temp_cleanup(dir.path()).await;
        assert!(!cache.stream_cache_path("31").exists());
        assert!(matches!(
            cache.open_stream(Some("31"), None).await.unwrap(),
            MediaSource::Upstream { .. }
        ));
    }

    #[tokio::test]
    async fn upstream_errors_pass_through_uncached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = cache(dir.path(), &server.uri(), 1024).await;

        let (status, body) = read_body(cache.open_stream(Some("13"), None).await.unwrap()).await;
        assert_eq!(status, 500);
        assert_eq!(body, b"boom");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!cache.stream_cache_path("13").exists());
    }

    #[tokio::test]
    async fn images_are_cached_by_url_hash() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cover.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = cache(dir.path(), &server.uri(), 1024 * 1024).await;
        let url = format!("{}/cover.jpg", server.uri());

        let first = cache.open_image(Some(&url)).await.unwrap();
        let second = cache.open_image(Some(&url)).await.unwrap();

        for source in [first, second] {
            match source {
                MediaSource::File(path) => {
                    assert_eq!(std::fs::read(&path).unwrap(), b"jpeg");
                    let name = path.file_name().unwrap().to_string_lossy().into_owned();
                    assert!(name.ends_with(".jpg"));
                    assert_eq!(name.len(), 64 + 4);
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        let err = cache.open_image(None).await.unwrap_err();
        assert!(matches!(err, MediaCacheError::MissingParameter("url")));
    }

    #[tokio::test]
    async fn sweep_evicts_oldest_first() {
        let dir = TempDir::new().unwrap();
        let cache = cache(dir.path(), "http://unused.invalid", 250).await;

        let oldest = dir.path().join("a.flac");
        let middle = dir.path().join("images").join("b.jpg");
        let newest = dir.path().join("c.flac");
        write_aged(&oldest, 100, 300);
        write_aged(&middle, 100, 200);
        write_aged(&newest, 100, 100);

        let report = cache.sweep().await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.remaining_bytes, 200);
        assert!(!oldest.exists());
        assert!(middle.exists());
        assert!(newest.exists());
    }

    #[tokio::test]
    async fn sweep_skips_in_flight_temp_files() {
        let dir = TempDir::new().unwrap();
        let cache = cache(dir.path(), "http://unused.invalid", 10).await;

        let temp = dir.path().join("9.flac.abc.part");
        write_aged(&temp, 100, 1000);
        let done = dir.path().join("9.flac");
        write_aged(&done, 100, 10);

        cache.sweep().await.unwrap();
        assert!(temp.exists());
        assert!(!done.exists());
    }

    #[tokio::test]
    async fn lowering_budget_sweeps_immediately() {
        let dir = TempDir::new().unwrap();
        let cache = cache(dir.path(), "http://unused.invalid", 10_000).await;
        let files: Vec<PathBuf> = (0..4).map(|i| dir.path().join(format!("{i}.flac"))).collect();
        for (age, file) in files.iter().enumerate() {
            write_aged(file, 100, 1000 - age as u64 * 100);
        }

        let report = cache.set_budget(0).await.unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(cache.budget(), tunebridge_config::DEFAULT_CACHE_BUDGET_BYTES);

        let report = cache.set_budget(150).await.unwrap();
        assert_eq!(cache.budget(), 150);
        assert_eq!(report.removed, 3);
        assert!(files[3].exists());
        assert!(!files[0].exists());
    }

    #[tokio::test]
    async fn clear_removes_everything_and_keeps_layout() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let cache = cache(&root, "http://unused.invalid", 10_000).await;
        std::fs::write(root.join("1.flac"), vec![1u8; 64]).unwrap();
        std::fs::write(root.join("images").join("x.jpg"), vec![1u8; 32]).unwrap();
        assert_eq!(cache.total_size().await.unwrap(), 96);

        cache.clear().await.unwrap();
        assert_eq!(cache.total_size().await.unwrap(), 0);
        assert!(root.join("images").is_dir());
    }

    #[tokio::test]
    async fn odd_track_ids_cannot_escape_the_cache() {
        let dir = TempDir::new().unwrap();
        let cache = cache(dir.path(), "http://unused.invalid", 1024).await;

        let path = cache.stream_cache_path("../../etc/passwd");
        assert_eq!(path.parent().unwrap(), dir.path());
        assert!(path.to_string_lossy().ends_with(".flac"));
        assert_eq!(cache.stream_cache_path("abc-1_2"), dir.path().join("abc-1_2.flac"));
    }
}
