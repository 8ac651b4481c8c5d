use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Local;
use dvf_market_analysis::config::Config;
use dvf_market_analysis::geo::amenities::{Amenity, AmenityClient};
use dvf_market_analysis::geo::geocode::Geocoder;
use dvf_market_analysis::geo::{BoundingBox, Coordinates};
use dvf_market_analysis::ingestion::fetch::{DvfClient, DvfFetcher};
use dvf_market_analysis::ingestion::{analyze, IngestError, MarketAnalysis, MutationLocation};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    fetcher: Arc<DvfFetcher<DvfClient>>,
    geocoder: Arc<Geocoder>,
    amenities: Arc<AmenityClient>,
}

#[derive(Serialize, Deserialize)]
struct ApiResponse {
    message: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct AnalysisQuery {
    address: String,
    period_months: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AmenityQuery {
    address: String,
}

#[derive(Serialize)]
struct AnalysisResponse {
    address: String,
    coordinates: Coordinates,
    bbox: String,
    period_months: u32,
    min_year: i32,
    #[serde(flatten)]
    analysis: MarketAnalysis,
}

#[derive(Serialize)]
struct AmenityResponse {
    address: String,
    coordinates: Coordinates,
    radius_meters: u32,
    amenities: Vec<Amenity>,
}

/// Maps pipeline errors onto HTTP statuses
struct ApiError(IngestError);

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            IngestError::Validation(_) => StatusCode::BAD_REQUEST,
            IngestError::NotFound(_) => StatusCode::NOT_FOUND,
            IngestError::AreaTooLarge(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_GATEWAY,
        };
        if status == StatusCode::BAD_GATEWAY {
            error!("Upstream error: {}", self.0);
        }
        let body = ApiResponse {
            message: self.0.to_string(),
            status: "error".to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🏠 Starting DVF market analysis API server...");

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let client = DvfClient::new(&config.dvf_api_url, config.http_timeout)?;
    let fetcher = DvfFetcher::from_client(client, config.retry_policy(), config.fetch_filters());
    let geocoder = Geocoder::new(
        &config.nominatim_url,
        config.http_timeout,
        config.geocode_cache_size,
    )?;
    let amenities = AmenityClient::new(&config.overpass_url, config.http_timeout)?;

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = AppState {
        config: Arc::new(config),
        fetcher: Arc::new(fetcher),
        geocoder: Arc::new(geocoder),
        amenities: Arc::new(amenities),
    };

    let app = Router::new()
        .route("/", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/analysis", get(get_analysis))
        .route("/api/amenities", get(get_amenities))
        .route("/api/mutations/:id", get(get_mutation))
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("🚀 Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        message: "DVF market analysis API is running!".to_string(),
        status: "ok".to_string(),
    })
}

async fn get_analysis(
    State(state): State<AppState>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let coordinates = state.geocoder.locate(&query.address).await?;
    let bbox = BoundingBox::around(coordinates);

    let period_months = query.period_months.unwrap_or(state.config.period_months);
    let min_year = state.config.min_year(Local::now().date_naive(), period_months);

    let analysis = analyze(state.fetcher.as_ref(), &bbox, min_year).await?;

    Ok(Json(AnalysisResponse {
        address: query.address,
        coordinates,
        bbox: bbox.to_string(),
        period_months,
        min_year,
        analysis,
    }))
}

async fn get_amenities(
    State(state): State<AppState>,
    Query(query): Query<AmenityQuery>,
) -> Result<Json<AmenityResponse>, ApiError> {
    let coordinates = state.geocoder.locate(&query.address).await?;
    let radius = state.config.search_radius_meters;
    let amenities = state.amenities.nearby(coordinates, radius).await?;

    Ok(Json(AmenityResponse {
        address: query.address,
        coordinates,
        radius_meters: radius,
        amenities,
    }))
}

async fn get_mutation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MutationLocation>, ApiError> {
    match state.fetcher.fetch_mutation(&id).await? {
        Some(location) => Ok(Json(location)),
        None => Err(ApiError(IngestError::NotFound(format!("mutation {}", id)))),
    }
}
