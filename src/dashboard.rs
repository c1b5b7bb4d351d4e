use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::dish_client::DishClient;
use crate::status::{ActionResponse, HealthResponse, StatusResponse, StatusService};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Dashboard page plus the JSON API. Unknown paths and wrong methods both
/// answer 404.
pub fn router<C: DishClient>(service: Arc<StatusService<C>>) -> Router {
    Router::new()
        .route("/", get(index_handler).fallback(not_found))
        .route("/index.html", get(index_handler).fallback(not_found))
        .route("/api/health", get(health_handler).fallback(not_found))
        .route("/api/status", get(status_handler::<C>).fallback(not_found))
        .route("/api/keepalive", post(keepalive_handler::<C>).fallback(not_found))
        .route("/api/reset", post(reset_handler::<C>).fallback(not_found))
        .fallback(not_found)
        .with_state(service)
}

/// Serve until `shutdown` turns true.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("[HTTP] dashboard at http://{}/", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}

fn json_response<T: Serialize>(body: T) -> Response {
    ([(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], Json(body)).into_response()
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("dashboard_static.html"))
}

async fn health_handler() -> Response {
    json_response(HealthResponse::now())
}

async fn status_handler<C: DishClient>(State(service): State<Arc<StatusService<C>>>) -> Response {
    let result = service.status().await;
    if let Err(e) = &result {
        log::warn!("[HTTP] status failed: {}", e);
    }
    json_response(StatusResponse::from(result))
}

async fn keepalive_handler<C: DishClient>(State(service): State<Arc<StatusService<C>>>) -> Response {
    json_response(ActionResponse::from_result(
        service.keepalive().await,
        "keepalive failed",
    ))
}

async fn reset_handler<C: DishClient>(State(service): State<Arc<StatusService<C>>>) -> Response {
    let result = service.reset_obstruction_map().await;
    match &result {
        Ok(_) => log::info!("[HTTP] obstruction map reset on request"),
        Err(e) => log::warn!("[HTTP] obstruction map reset failed: {}", e),
    }
    json_response(ActionResponse::from_result(result, "reset failed"))
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Not found",
    )
        .into_response()
}
