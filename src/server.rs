use crate::config::AppConfig;
use crate::error::IngestError;
use crate::geometry::load_feature_collection;
use crate::interaction::{DetailPanel, InteractionController, InteractionEvent};
use crate::layers::{FeatureKeys, RegionLayerController};
use crate::pipeline::IngestionPipeline;
use crate::scene::SceneSurface;
use crate::stats::Statistics;
use crate::types::{InteractionState, LocationBatch, RegionStat};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

pub type Session = InteractionController<SceneSurface>;

pub struct AppState {
    pub config: AppConfig,
    pub pipeline: IngestionPipeline,
    pub session: Mutex<Session>,
    /// Bumped by every refresh; only the latest refresh may touch the session.
    refresh_generation: AtomicU64,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: IngestionPipeline, session: Session) -> Self {
        Self {
            config,
            pipeline,
            session: Mutex::new(session),
            refresh_generation: AtomicU64::new(0),
        }
    }
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct QueryResponse {
    id: String,
    name: String,
    stats: Option<RegionStat>,
}

#[derive(Serialize)]
pub struct ViewResponse {
    state: InteractionState,
    panel: DetailPanel,
    scene: SceneSurface,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    statistics_available: bool,
    regions_with_statistics: usize,
    locations: Option<usize>,
    error: Option<String>,
    /// False when a newer refresh started before this one finished.
    applied: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(err: IngestError) -> ApiError {
    let status = match err {
        IngestError::MissingAccessKey => StatusCode::SERVICE_UNAVAILABLE,
        IngestError::SourceUnavailable { .. } | IngestError::EmptyDataset { .. } => StatusCode::BAD_GATEWAY,
    };
    (status, Json(ErrorBody { error: err.to_string() }))
}

/// Loads region and overlay geometry and wires them into a fresh session.
pub fn build_session(config: &AppConfig, statistics: Statistics) -> Result<Session> {
    let geometry = &config.geometry;
    let layers = RegionLayerController::new(
        SceneSurface::default(),
        FeatureKeys {
            region_id: geometry.region_id_property.clone(),
            region_name: geometry.region_name_property.clone(),
            overlay_discriminant: geometry.overlay_discriminant_property.clone(),
        },
    );
    let mut session = InteractionController::new(layers, statistics);

    let regions = load_feature_collection(&geometry.regions)?;
    session.load_regions(regions);

    if let Some(path) = &geometry.overlay {
        let overlay = load_feature_collection(path)?;
        session.load_overlay(overlay, &geometry.overlay_filter);
    }

    Ok(session)
}

fn view(session: &Session) -> ViewResponse {
    ViewResponse {
        state: session.state().clone(),
        panel: session.panel().clone(),
        scene: session.layers().surface().clone(),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.server.static_dir.clone();

    Router::new()
        .route("/api/locations", get(locations_handler))
        .route("/api/regions/:id", get(region_handler))
        .route("/api/query", get(query_handler))
        .route("/api/scene", get(scene_handler))
        .route("/api/events", post(event_handler))
        .route("/api/refresh", post(refresh_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let pipeline = IngestionPipeline::from_config(&config);

    // Statistics failures degrade the panel; region rendering goes ahead.
    let statistics = pipeline.load_statistics().await;
    let session = build_session(&config, statistics)?;

    if let Err(e) = pipeline.load_locations().await {
        warn!("Locations unavailable at start-up: {}", e);
    }

    let port = config.server.port;
    let state = Arc::new(AppState::new(config, pipeline, session));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn locations_handler(State(state): State<Arc<AppState>>) -> Result<Json<LocationBatch>, ApiError> {
    let batch = state.pipeline.load_locations().await.map_err(api_error)?;
    Ok(Json(batch.as_ref().clone()))
}

async fn region_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Option<RegionStat>> {
    let session = state.session.lock().await;
    Json(session.statistics().index().and_then(|index| index.lookup(&id)).cloned())
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    let session = state.session.lock().await;
    let response = session.layers().region_at(params.lat, params.lon).map(|region| QueryResponse {
        id: region.id.clone(),
        name: region.name.clone(),
        stats: session
            .statistics()
            .index()
            .and_then(|index| index.lookup(&region.id))
            .cloned(),
    });
    Json(response)
}

async fn scene_handler(State(state): State<Arc<AppState>>) -> Json<ViewResponse> {
    let session = state.session.lock().await;
    Json(view(&session))
}

async fn event_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<InteractionEvent>,
) -> Json<ViewResponse> {
    let mut session = state.session.lock().await;
    session.handle(&event);
    Json(view(&session))
}

async fn refresh_handler(State(state): State<Arc<AppState>>) -> Json<RefreshResponse> {
    let generation = state.refresh_generation.fetch_add(1, Ordering::SeqCst) + 1;
    state.pipeline.invalidate();

    let statistics = state.pipeline.load_statistics().await;
    let locations = state.pipeline.load_locations().await;

    let mut response = RefreshResponse {
        statistics_available: statistics.index().is_some(),
        regions_with_statistics: statistics.index().map_or(0, |index| index.len()),
        locations: locations.as_ref().ok().map(|batch| batch.collection.location_count()),
        error: locations.err().map(|e| e.to_string()),
        applied: false,
    };

    let mut session = state.session.lock().await;
    if state.refresh_generation.load(Ordering::SeqCst) == generation {
        session.set_statistics(statistics);
        response.applied = true;
    } else {
        debug!("Refresh {} superseded, discarding its statistics", generation);
    }
    Json(response)
}
