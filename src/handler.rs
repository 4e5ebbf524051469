//! HTTP endpoints of the annotation service.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::api::{self, Annotations, Annotator, Request};
use crate::error::{Error, Result};
use crate::ip::parse_ip;
use crate::manager::AnnotatorManager;
use crate::metrics::{Metrics, METRICS};
use crate::site::SiteAnnotations;

/// Only one in this many unknown addresses is logged.
const NODE_NOT_FOUND_SAMPLE: u64 = 100;

static NODE_NOT_FOUND: AtomicU64 = AtomicU64::new(0);

/// Shared state of the handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AnnotatorManager>,
    pub sites: Arc<SiteAnnotations>,
}

impl AppState {
    pub fn new(manager: Arc<AnnotatorManager>, sites: SiteAnnotations) -> Self {
        Self {
            manager,
            sites: Arc::new(sites),
        }
    }
}

/// Routes of the service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/annotate", post(annotate_handler))
        .route("/metrics", get(metrics_handler))
        .route(
            "/cron/update_maxmind_datasets",
            get(update_handler).post(update_handler),
        )
        .with_state(state)
}

/// Serve the routes on `listener` until the server fails.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Annotation server listening on http://{}/", addr);
    }
    axum::serve(listener, router(state))
        .await
        .map_err(Error::Io)
}

/// Annotate every address of `request`. Addresses that fail are left out
/// of the response.
pub fn annotate_batch(
    manager: &AnnotatorManager,
    sites: &SiteAnnotations,
    request: &Request,
) -> Result<api::Response> {
    let annotator = manager.get_annotator(request.date)?;
    let mut annotations = HashMap::with_capacity(request.ips.len());

    for text in &request.ips {
        let ip = match parse_ip(text) {
            Ok(ip) => ip,
            Err(e) => {
                record_failure(text, &e);
                continue;
            }
        };

        if let Some(site) = sites.lookup(ip) {
            Metrics::inc(&METRICS.site_annotations);
            annotations.insert(text.clone(), site.clone());
            continue;
        }

        let mut ann = Annotations::default();
        match annotator.annotate(ip, &mut ann) {
            Ok(()) => {
                Metrics::inc(&METRICS.ips_annotated);
                annotations.insert(text.clone(), ann);
            }
            Err(e) => record_failure(text, &e),
        }
    }

    Ok(api::Response {
        annotator_date: annotator.annotator_date(),
        annotations,
    })
}

fn record_failure(ip: &str, e: &Error) {
    METRICS.ip_failure(e.kind());
    match e {
        Error::NodeNotFound(_) => {
            if NODE_NOT_FOUND.fetch_add(1, Ordering::Relaxed) % NODE_NOT_FOUND_SAMPLE == 0 {
                log::debug!("No interval for {} (sampled)", ip);
            }
        }
        _ => log::debug!("Could not annotate {}: {}", ip, e),
    }
}

async fn annotate_handler(State(state): State<AppState>, body: Bytes) -> Response {
    Metrics::inc(&METRICS.requests);

    let request = match Request::decode(&body) {
        Ok(request) => request,
        Err(e) => {
            Metrics::inc(&METRICS.requests_rejected);
            log::warn!("Rejected annotation request: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    match annotate_batch(&state.manager, &state.sites, &request) {
        Ok(response) => Json(response).into_response(),
        Err(Error::Loading) => {
            Metrics::inc(&METRICS.requests_loading);
            (StatusCode::SERVICE_UNAVAILABLE, Error::Loading.to_string()).into_response()
        }
        Err(e) => {
            log::error!("Annotation of {} addresses failed: {}", request.ips.len(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn metrics_handler() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.render(),
    )
        .into_response()
}

async fn update_handler(State(state): State<AppState>) -> Response {
    match rescan(state.manager.clone()).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Rescan the store off the async workers and retry failed datasets.
pub async fn rescan(manager: Arc<AnnotatorManager>) -> Result<()> {
    let result = tokio::task::spawn_blocking(move || -> Result<()> {
        manager.update()?;
        manager.retry_failed();
        Ok(())
    })
    .await
    .map_err(|e| Error::Config(format!("rescan task failed: {}", e)))?;

    if let Err(e) = &result {
        log::error!("Dataset rescan failed: {}", e);
    }
    result
}
