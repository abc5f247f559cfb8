// SPDX-License-Identifier: GPL-3.0-or-later

//! Pipeline tests against an in-memory catalog.

#[cfg(test)]
mod pipeline_tests {
    use crate::catalog::{CatalogError, DestinationCatalog};
    use crate::events::TransferLog;
    use crate::matching::TrackMatcher;
    use crate::transfer::{
        MetadataResolver, TransferError, TransferPipeline, TransferSettings,
    };
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tunebridge_domain::{
        CandidateTrack, ContainerDetails, ContainerSummary, ContainerUpdate, SourceTrack,
        TrackStatus, TransferStats,
    };

    #[derive(Default)]
    struct FakeCatalog {
        unauthenticated: bool,
        results: HashMap<String, Vec<CandidateTrack>>,
        failing_queries: HashSet<String>,
        search_delay: Option<Duration>,
        fail_create: bool,
        existing: Vec<CandidateTrack>,
        scripted_adds: Mutex<HashMap<String, VecDeque<CatalogError>>>,
        queries: Mutex<Vec<String>>,
        add_attempts: Mutex<HashMap<String, usize>>,
        creates: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl FakeCatalog {
        fn with_result(mut self, query: &str, tracks: Vec<CandidateTrack>) -> Self {
            self.results.insert(query.to_string(), tracks);
            self
        }

        fn failing(mut self, query: &str) -> Self {
            self.failing_queries.insert(query.to_string());
            self
        }

        fn script_add(self, track_id: &str, errors: Vec<CatalogError>) -> Self {
            self.scripted_adds
                .lock()
                .unwrap()
                .insert(track_id.to_string(), errors.into());
            self
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }

        fn attempts(&self, track_id: &str) -> usize {
            self.add_attempts
                .lock()
                .unwrap()
                .get(track_id)
                .copied()
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl DestinationCatalog for FakeCatalog {
        fn is_authenticated(&self) -> bool {
            !self.unauthenticated
        }

        async fn search(&self, query: &str) -> Result<Vec<CandidateTrack>, CatalogError> {
            self.queries.lock().unwrap().push(query.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.search_delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing_queries.contains(query) {
                return Err(CatalogError::HttpStatus {
                    status: 500,
                    body: "search exploded".to_string(),
                });
            }
            Ok(self.results.get(query).cloned().unwrap_or_default())
        }

        async fn create_container(&self, _: &str, _: &str) -> Result<String, CatalogError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.fail_create {
                return Err(CatalogError::HttpStatus {
                    status: 503,
                    body: String::new(),
                });
            }
            Ok("lib-1".to_string())
        }

        async fn add_track(&self, _: &str, track: &CandidateTrack) -> Result<(), CatalogError> {
            *self
                .add_attempts
                .lock()
                .unwrap()
                .entry(track.id.clone())
                .or_default() += 1;
            let scripted = self
                .scripted_adds
                .lock()
                .unwrap()
                .get_mut(&track.id)
                .and_then(VecDeque::pop_front);
            match scripted {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn container_details(&self, id: &str) -> Result<ContainerDetails, CatalogError> {
            Ok(ContainerDetails {
                id: id.to_string(),
                name: "Road Trip".to_string(),
                description: String::new(),
                is_public: true,
                tracks: self.existing.clone(),
            })
        }

        async fn containers(&self) -> Result<Vec<ContainerSummary>, CatalogError> {
            Ok(Vec::new())
        }

        async fn remove_track(&self, _: &str, _: &str) -> Result<(), CatalogError> {
            Ok(())
        }

        async fn update_container(&self, _: &str, _: &ContainerUpdate) -> Result<(), CatalogError> {
            Ok(())
        }

        async fn delete_container(&self, _: &str) -> Result<(), CatalogError> {
            Ok(())
        }
    }

    struct FixedResolver(Option<SourceTrack>);

    #[async_trait]
    impl MetadataResolver for FixedResolver {
        async fn resolve(&self, _: &str, _: &str) -> anyhow::Result<Option<SourceTrack>> {
            Ok(self.0.clone())
        }
    }

    fn fast_settings() -> TransferSettings {
        TransferSettings {
            max_concurrency: 3,
            match_delay: Duration::ZERO,
            add_delay: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            max_add_attempts: 3,
        }
    }

    fn pipeline(catalog: Arc<FakeCatalog>) -> TransferPipeline {
        TransferPipeline::new(catalog, TrackMatcher::default(), fast_settings())
    }

    fn rate_limited() -> CatalogError {
        CatalogError::HttpStatus {
            status: 429,
            body: "Too Many Requests".to_string(),
        }
    }

    fn queen() -> SourceTrack {
        SourceTrack::new("Queen", "Bohemian Rhapsody")
    }

    fn queen_candidate() -> CandidateTrack {
        CandidateTrack::new("101", "Queen", "Bohemian Rhapsody (Remastered)")
    }

    #[tokio::test]
    async fn single_track_is_matched_and_added() {
        let catalog = Arc::new(
            FakeCatalog::default().with_result("Queen Bohemian Rhapsody", vec![queen_candidate()]),
        );
        let log = TransferLog::new();

        let report = pipeline(catalog.clone())
            .run("Road Trip", "", &[queen()], Arc::new(log.clone()))
            .await
            .unwrap();

        assert_eq!(report.container_id, "lib-1");
        assert_eq!(
            report.stats,
            TransferStats { total: 1, matched: 1, added: 1, failed: 0 }
        );
        assert_eq!(log.final_statuses(1)[0].status, TrackStatus::Added);
        assert!(log.lines().iter().any(|line| line.contains("Score: 100%")));
    }

    #[tokio::test]
    async fn unmatched_tracks_count_as_failed() {
        let catalog = Arc::new(
            FakeCatalog::default()
                .with_result("Queen Bohemian Rhapsody", vec![queen_candidate()])
                .with_result(
                    "Queen Innuendo",
                    vec![CandidateTrack::new("102", "Queen", "Innuendo")],
                )
                .with_result(
                    "Nobody Unknown Song",
                    vec![CandidateTrack::new("900", "Metallica", "One")],
                ),
        );
        let log = TransferLog::new();
        let tracks = vec![
            queen(),
            SourceTrack::new("Nobody", "Unknown Song"),
            SourceTrack::new("Queen", "Innuendo"),
        ];

        let report = pipeline(catalog)
            .run("Mix", "", &tracks, Arc::new(log.clone()))
            .await
            .unwrap();

        assert_eq!(
            report.stats,
            TransferStats { total: 3, matched: 2, added: 2, failed: 1 }
        );
        let statuses: Vec<TrackStatus> =
            log.final_statuses(3).into_iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![TrackStatus::Added, TrackStatus::NotFound, TrackStatus::Added]
        );
    }

    #[tokio::test]
    async fn rate_limited_adds_stop_after_three_attempts() {
        let catalog = Arc::new(
            FakeCatalog::default()
                .with_result("Queen Bohemian Rhapsody", vec![queen_candidate()])
                .script_add("101", vec![rate_limited(), rate_limited(), rate_limited(), rate_limited()]),
        );
        let log = TransferLog::new();

        let report = pipeline(catalog.clone())
            .run("Road Trip", "", &[queen()], Arc::new(log.clone()))
            .await
            .unwrap();

        assert_eq!(catalog.attempts("101"), 3);
        assert_eq!(
            report.stats,
            TransferStats { total: 1, matched: 1, added: 0, failed: 1 }
        );
        let final_status = &log.final_statuses(1)[0];
        assert_eq!(final_status.status, TrackStatus::Error);
        assert!(final_status.error.as_deref().unwrap_or_default().contains("429"));
        assert_eq!(
            log.lines().iter().filter(|line| line.contains("Retry")).count(),
            2
        );
    }

    #[tokio::test]
    async fn other_add_failures_are_not_retried() {
        let catalog = Arc::new(
            FakeCatalog::default()
                .with_result("Queen Bohemian Rhapsody", vec![queen_candidate()])
                .script_add(
                    "101",
                    vec![CatalogError::HttpStatus { status: 500, body: "boom".to_string() }],
                ),
        );

        let report = pipeline(catalog.clone())
            .run("Road Trip", "", &[queen()], Arc::new(TransferLog::new()))
            .await
            .unwrap();

        assert_eq!(catalog.attempts("101"), 1);
        assert_eq!(report.stats.added, 0);
        assert_eq!(report.stats.failed, 1);
    }

    #[tokio::test]
    async fn rate_limit_then_success_is_added() {
        let catalog = Arc::new(
            FakeCatalog::default()
                .with_result("Queen Bohemian Rhapsody", vec![queen_candidate()])
                .script_add("101", vec![rate_limited()]),
        );

        let report = pipeline(catalog.clone())
            .run("Road Trip", "", &[queen()], Arc::new(TransferLog::new()))
            .await
            .unwrap();

        assert_eq!(catalog.attempts("101"), 2);
        assert_eq!(report.stats.added, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_backoff_grows_with_attempt_number() {
        let catalog = Arc::new(
            FakeCatalog::default()
                .with_result("Queen Bohemian Rhapsody", vec![queen_candidate()])
                .script_add("101", vec![rate_limited(), rate_limited()]),
        );
        let settings = TransferSettings {
            retry_backoff: Duration::from_secs(2),
            ..fast_settings()
        };
        let start = tokio::time::Instant::now();

        TransferPipeline::new(catalog.clone(), TrackMatcher::default(), settings)
            .run("Road Trip", "", &[queen()], Arc::new(TransferLog::new()))
            .await
            .unwrap();

        // 2s after the first 429, 4s after the second.
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert_eq!(catalog.attempts("101"), 3);
    }

    #[tokio::test]
    async fn zero_matches_skip_container_creation() {
        let catalog = Arc::new(FakeCatalog::default());
        let log = TransferLog::new();

        let err = pipeline(catalog.clone())
            .run("Road Trip", "", &[queen()], Arc::new(log.clone()))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::NoTracksMatched { .. }));
        assert_eq!(
            err.stats(),
            Some(TransferStats { total: 1, matched: 0, added: 0, failed: 1 })
        );
        assert_eq!(catalog.creates.load(Ordering::SeqCst), 0);
        assert!(log.lines().iter().any(|line| line.contains("No tracks matched")));
    }

    #[tokio::test]
    async fn container_creation_failure_reports_match_stats() {
        let mut fake =
            FakeCatalog::default().with_result("Queen Bohemian Rhapsody", vec![queen_candidate()]);
        fake.fail_create = true;
        let catalog = Arc::new(fake);

        let err = pipeline(catalog.clone())
            .run("Road Trip", "", &[queen(), SourceTrack::new("Nobody", "Nothing")], Arc::new(TransferLog::new()))
            .await
            .unwrap_err();

        match err {
            TransferError::ContainerCreation { stats, source } => {
                assert_eq!(stats.matched, 1);
                assert_eq!(stats.failed, 1);
                assert_eq!(source.status(), Some(503));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(catalog.attempts("101"), 0);
    }

    #[tokio::test]
    async fn search_failure_marks_track_not_found_without_aborting() {
        let catalog = Arc::new(
            FakeCatalog::default()
                .failing("Broken Track")
                .with_result("Queen Bohemian Rhapsody", vec![queen_candidate()]),
        );
        let log = TransferLog::new();
        let tracks = vec![SourceTrack::new("Broken", "Track"), queen()];

        let report = pipeline(catalog)
            .run("Road Trip", "", &tracks, Arc::new(log.clone()))
            .await
            .unwrap();

        assert_eq!(report.stats.matched, 1);
        assert_eq!(report.stats.failed, 1);
        let broken = &log.final_statuses(2)[0];
        assert_eq!(broken.status, TrackStatus::NotFound);
        assert!(broken.error.as_deref().unwrap_or_default().contains("search exploded"));
    }

    #[tokio::test]
    async fn cleaned_query_is_tried_after_raw_query() {
        let catalog = Arc::new(
            FakeCatalog::default().with_result("Queen Bohemian Rhapsody", vec![queen_candidate()]),
        );
        let track = SourceTrack::new("Queen", "Bohemian Rhapsody (Remastered 2011)");

        let report = pipeline(catalog.clone())
            .run("Road Trip", "", &[track], Arc::new(TransferLog::new()))
            .await
            .unwrap();

        assert_eq!(report.stats.matched, 1);
        assert_eq!(
            catalog.queries(),
            vec![
                "Queen Bohemian Rhapsody (Remastered 2011)".to_string(),
                "Queen Bohemian Rhapsody".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn resolver_supplies_canonical_metadata() {
        let catalog = Arc::new(
            FakeCatalog::default().with_result("Queen Bohemian Rhapsody", vec![queen_candidate()]),
        );
        let resolver = Arc::new(FixedResolver(Some(queen())));
        let log = TransferLog::new();

        let report = pipeline(catalog.clone())
            .with_resolver(resolver)
            .run("Road Trip", "", &[SourceTrack::new("Qween", "Bohemain Rapsody")], Arc::new(log.clone()))
            .await
            .unwrap();

        assert_eq!(report.stats.added, 1);
        assert_eq!(
            catalog.queries(),
            vec![
                "Qween Bohemain Rapsody".to_string(),
                "Bohemain Rapsody".to_string(),
                "Queen Bohemian Rhapsody".to_string(),
            ]
        );
        assert!(log.lines().iter().any(|line| line.contains("Metadata lookup found")));
    }

    #[tokio::test]
    async fn long_titles_fall_back_to_first_three_words() {
        let candidate = CandidateTrack::new("7", "Band", "One Two Three Four Five");
        let catalog =
            Arc::new(FakeCatalog::default().with_result("One Two Three", vec![candidate]));

        let report = pipeline(catalog.clone())
            .run(
                "Road Trip",
                "",
                &[SourceTrack::new("Band", "One Two Three Four Five")],
                Arc::new(TransferLog::new()),
            )
            .await
            .unwrap();

        assert_eq!(report.stats.matched, 1);
        assert_eq!(catalog.queries().last().map(String::as_str), Some("One Two Three"));
    }

    #[tokio::test]
    async fn tracks_already_in_container_are_not_added() {
        let mut fake =
            FakeCatalog::default().with_result("Queen Bohemian Rhapsody", vec![queen_candidate()]);
        fake.existing = vec![queen_candidate()];
        let catalog = Arc::new(fake);
        let log = TransferLog::new();

        let report = pipeline(catalog.clone())
            .run("Road Trip", "", &[queen()], Arc::new(log.clone()))
            .await
            .unwrap();

        assert_eq!(catalog.attempts("101"), 0);
        assert_eq!(report.stats.failed, 1);
        assert!(log.final_statuses(1)[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("already exists"));
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_request() {
        let mut fake = FakeCatalog::default();
        fake.unauthenticated = true;
        let catalog = Arc::new(fake);

        let err = pipeline(catalog.clone())
            .run("Road Trip", "", &[queen()], Arc::new(TransferLog::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::NotAuthenticated));
        assert!(catalog.queries().is_empty());
    }

    #[tokio::test]
    async fn searches_respect_concurrency_limit() {
        let mut fake = FakeCatalog::default();
        fake.search_delay = Some(Duration::from_millis(5));
        for i in 0..8 {
            fake.results.insert(
                format!("Artist {i} Song {i}"),
                vec![CandidateTrack::new(format!("{i}"), format!("Artist {i}"), format!("Song {i}"))],
            );
        }
        let catalog = Arc::new(fake);
        let tracks: Vec<SourceTrack> = (0..8)
            .map(|i| SourceTrack::new(format!("Artist {i}"), format!("Song {i}")))
            .collect();
        let settings = TransferSettings {
            max_concurrency: 2,
            ..fast_settings()
        };

        let report = TransferPipeline::new(catalog.clone(), TrackMatcher::default(), settings)
            .run("Road Trip", "", &tracks, Arc::new(TransferLog::new()))
            .await
            .unwrap();

        assert_eq!(report.stats.added, 8);
        assert!(catalog.peak_in_flight.load(Ordering::SeqCst) <= 2);
    }
}
