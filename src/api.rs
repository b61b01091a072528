//! HTTP routes and handlers.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, OriginalUri, Request, State},
    handler::HandlerWithoutStateExt,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::{Html, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};

use crate::error::{ApiError, UploadError};
use crate::orchestrator::{DebugStatus, UploadResponse};
use crate::state::AppState;
use crate::upload::{self, MAX_IMAGE_BYTES, MEDIA_PREFIX};

/// Room for multipart boundaries and headers around a maximum-size image.
const BODY_LIMIT: usize = MAX_IMAGE_BYTES + 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    let media = ServiceBuilder::new()
        .layer(middleware::from_fn(media_content_type))
        .service(
            ServeDir::new(state.service.store().dir())
                .fallback(route_not_found.into_service()),
        );

    let api_routes = Router::new()
        .route(
            "/upload",
            post(upload_image)
                .fallback(route_not_found)
                .layer(DefaultBodyLimit::max(BODY_LIMIT)),
        )
        .route("/debug", get(debug_status).fallback(route_not_found));

    Router::new()
        .route("/", get(index).fallback(route_not_found))
        .route("/health", get(health).fallback(route_not_found))
        .nest("/api", api_routes)
        .nest_service(MEDIA_PREFIX, media)
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let request_id = format!("{:08x}", rand::random::<u32>());
    let span = info_span!("upload", %request_id);

    async move {
        info!("New upload request");
        let mut multipart =
            multipart.map_err(|rejection| UploadError::Malformed(rejection.body_text()))?;
        let candidate = upload::read_image_field(&mut multipart)
            .await
            .inspect_err(|err| warn!("Rejected upload: {}", err))?;

        let outcome = state.service.process(candidate).await?;
        Ok::<_, ApiError>(Json(outcome.into_response()))
    }
    .instrument(span)
    .await
}

async fn debug_status(State(state): State<AppState>) -> Json<DebugStatus> {
    Json(state.service.debug_status().await)
}

#[derive(Debug, Serialize)]
struct HealthEnv {
    port: u16,
    /// Keeps the key existing browser clients already read.
    #[serde(rename = "nodeEnv")]
    app_env: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    timestamp: String,
    env: HealthEnv,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "StoryLens API is running",
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        env: HealthEnv {
            port: state.config.port,
            app_env: state.config.app_env.clone(),
        },
    })
}

async fn route_not_found(method: Method, OriginalUri(uri): OriginalUri) -> ApiError {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    warn!("404 - Route not found: {} {}", method, path);
    ApiError::NotFound {
        path,
        method: method.to_string(),
    }
}

/// Content type the browser client expects for a media file, by extension.
pub fn media_type_for(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "wav" | "mp3" => Some("audio/wav"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

async fn media_content_type(req: Request, next: Next) -> Response {
    let forced = media_type_for(req.uri().path());
    let mut response = next.run(req).await;
    if let Some(content_type) = forced {
        if response.status().is_success() {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }
    response
}
