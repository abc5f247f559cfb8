// SPDX-License-Identifier: GPL-3.0-or-later
pub mod handlers;
pub mod middleware;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use handlers::cache::{
    cache_status, clear_cache, set_cache_budget, CacheBudgetRequest, CacheBudgetResponse,
    CacheStatusResponse, __path_cache_status, __path_clear_cache, __path_set_cache_budget,
};
use handlers::downloads::{
    clear_download_history, download_history, download_queue, enqueue_download,
    failed_downloads, DownloadItemResponse, DownloadRequest, EnqueuedResponse,
    __path_clear_download_history, __path_download_history, __path_download_queue,
    __path_enqueue_download, __path_failed_downloads,
};
use handlers::libraries::{
    add_library_track, delete_library, get_library, list_libraries, remove_library_track,
    update_library, AddLibraryTrackRequest, LibraryDetailsResponse, LibraryResponse,
    LibraryTrackResponse, UpdateLibraryRequest, __path_add_library_track, __path_delete_library,
    __path_get_library, __path_list_libraries, __path_remove_library_track,
    __path_update_library,
};
use handlers::media::{__path_image, __path_stream, image, stream};
use handlers::search::{search_tracks, CatalogTrackResponse, __path_search_tracks};
use handlers::tracks::{stream_url, StreamUrlResponse, __path_stream_url};
use handlers::transfers::{
    clear_transfers, create_transfer, delete_transfer, list_transfers, CreateTransferRequest,
    StatsResponse, TrackRequest, TrackStatusResponse, TransferRecordResponse, TransferResponse,
    __path_clear_transfers, __path_create_transfer, __path_delete_transfer,
    __path_list_transfers,
};
use handlers::ErrorResponse;
use middleware::cors::cors_middleware;
use serde::Serialize;
use tracing::info;
use tunebridge_application::AppState;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Serialize, utoipa::ToSchema)]
struct HealthResponse {
    status: &'static str,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        stream,
        image,
        stream_url,
        search_tracks,
        create_transfer,
        list_transfers,
        clear_transfers,
        delete_transfer,
        enqueue_download,
        download_queue,
        failed_downloads,
        download_history,
        clear_download_history,
        list_libraries,
        get_library,
        update_library,
        delete_library,
        add_library_track,
        remove_library_track,
        cache_status,
        clear_cache,
        set_cache_budget,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            StreamUrlResponse,
            CatalogTrackResponse,
            TrackRequest,
            CreateTransferRequest,
            StatsResponse,
            TrackStatusResponse,
            TransferResponse,
            TransferRecordResponse,
            DownloadRequest,
            EnqueuedResponse,
            DownloadItemResponse,
            LibraryResponse,
            LibraryTrackResponse,
            LibraryDetailsResponse,
            UpdateLibraryRequest,
            AddLibraryTrackRequest,
            CacheStatusResponse,
            CacheBudgetRequest,
            CacheBudgetResponse,
        )
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "media", description = "Audio and cover streaming through the local cache"),
        (name = "search", description = "Destination catalog search"),
        (name = "transfers", description = "Playlist transfer runs and their history"),
        (name = "downloads", description = "Download queue and history"),
        (name = "libraries", description = "Destination catalog containers"),
        (name = "cache", description = "Media cache housekeeping")
    ),
    info(
        title = "Tunebridge API",
        version = "0.1.0",
        description = "Local companion service for moving music collections between catalogs",
    )
)]
struct ApiDoc;

pub fn router(state: AppState) -> Router {
    info!(target: "api", "building router");

    let api_v1 = Router::new()
        .route("/transfers", get(list_transfers).post(create_transfer).delete(clear_transfers))
        .route("/transfers/:id", delete(delete_transfer))
        .route("/downloads", post(enqueue_download))
        .route("/downloads/queue", get(download_queue))
        .route("/downloads/failed", get(failed_downloads))
        .route(
            "/downloads/history",
            get(download_history).delete(clear_download_history),
        )
        .route("/search", get(search_tracks))
        .route("/tracks/:id/stream-url", get(stream_url))
        .route("/libraries", get(list_libraries))
        .route(
            "/libraries/:id",
            get(get_library).patch(update_library).delete(delete_library),
        )
        .route("/libraries/:id/tracks", post(add_library_track))
        .route("/libraries/:id/tracks/:track_id", delete(remove_library_track))
        .route("/cache", get(cache_status).delete(clear_cache))
        .route("/cache/budget", put(set_cache_budget));

    let media = Router::new()
        .route("/stream", get(stream))
        .route("/image", get(image))
        .layer(axum_middleware::from_fn(cors_middleware));

    let openapi = ApiDoc::openapi();

    Router::new()
        .route("/health", get(health))
        .merge(media)
        .nest("/api/v1", api_v1)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", openapi))
        .with_state(state)
}
