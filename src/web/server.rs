//! HTTP front-end: status/text long-polling and lifecycle commands.
//!
//! The long-poll contract: a request carrying the hash of the value it last
//! saw is held open (up to one second) until the value's hash differs, then
//! answered with the current snapshot. A request with a stale or absent
//! hash is answered immediately. The check-then-wait runs entirely under
//! the runtime's monitor lock, so no update between check and wait can be
//! missed.

use crate::audio;
use crate::config::GateConfigPatch;
use crate::defaults;
use crate::runtime::{LifecycleController, Runtime, StatusSnapshot, TextSnapshot};
use crate::web::assets::HtmlAssets;
use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything the handlers need, shared across connections.
pub struct WebContext {
    pub controller: LifecycleController,
    pub assets: HtmlAssets,
}

impl WebContext {
    fn runtime(&self) -> &Arc<Runtime> {
        self.controller.runtime()
    }
}

/// Builds the front-end router.
pub fn router(ctx: Arc<WebContext>) -> Router {
    Router::new()
        .route("/text", get(text_handler))
        .route("/status", get(status_handler))
        .route("/enable", get(enable_handler))
        .route("/disable", get(disable_handler))
        .route("/set_audio_input_device", get(set_device_handler))
        .route("/set_config_dict", get(set_config_handler))
        .route("/audio_input_device_list", get(device_list_handler))
        .fallback(get(asset_handler))
        .with_state(ctx)
}

/// Serves the router until the shutdown future resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    ctx: Arc<WebContext>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Bad request").into_response()
}

fn ok_result() -> Response {
    Json(json!({"result": "OK"})).into_response()
}

#[derive(Deserialize)]
struct TextQuery {
    last_text_md5: Option<String>,
}

async fn text_handler(
    State(ctx): State<Arc<WebContext>>,
    Query(query): Query<TextQuery>,
) -> Json<TextSnapshot> {
    let snapshot = match query.last_text_md5 {
        Some(known) => {
            let runtime = Arc::clone(ctx.runtime());
            tokio::task::spawn_blocking(move || {
                runtime.wait_for_text(&known, defaults::LONG_POLL_TIMEOUT)
            })
            .await
            .unwrap_or_else(|_| ctx.runtime().text_snapshot())
        }
        None => ctx.runtime().text_snapshot(),
    };
    Json(snapshot)
}

#[derive(Deserialize)]
struct StatusQuery {
    last_status_hash: Option<String>,
}

async fn status_handler(
    State(ctx): State<Arc<WebContext>>,
    Query(query): Query<StatusQuery>,
) -> Json<StatusSnapshot> {
    let snapshot = match query.last_status_hash {
        Some(known) => {
            let runtime = Arc::clone(ctx.runtime());
            tokio::task::spawn_blocking(move || {
                runtime.wait_for_status(&known, defaults::LONG_POLL_TIMEOUT)
            })
            .await
            .unwrap_or_else(|_| ctx.runtime().status_snapshot())
        }
        None => ctx.runtime().status_snapshot(),
    };
    Json(snapshot)
}

async fn enable_handler(State(ctx): State<Arc<WebContext>>) -> Response {
    let ctx = Arc::clone(&ctx);
    let _ = tokio::task::spawn_blocking(move || ctx.controller.enable()).await;
    ok_result()
}

async fn disable_handler(State(ctx): State<Arc<WebContext>>) -> Response {
    let ctx = Arc::clone(&ctx);
    let _ = tokio::task::spawn_blocking(move || ctx.controller.disable()).await;
    ok_result()
}

#[derive(Deserialize)]
struct SetDeviceQuery {
    hash: Option<String>,
}

async fn set_device_handler(
    State(ctx): State<Arc<WebContext>>,
    Query(query): Query<SetDeviceQuery>,
) -> Response {
    let Some(hash) = query.hash else {
        return bad_request();
    };
    debug!(hash = %hash, "selecting audio input device");
    ctx.runtime().set_device_hash(&hash);
    ok_result()
}

#[derive(Deserialize)]
struct SetConfigQuery {
    config: Option<String>,
}

async fn set_config_handler(
    State(ctx): State<Arc<WebContext>>,
    Query(query): Query<SetConfigQuery>,
) -> Response {
    let Some(encoded) = query.config else {
        return bad_request();
    };
    let Ok(decoded) = BASE64_STANDARD.decode(encoded.as_bytes()) else {
        return bad_request();
    };
    let Ok(payload) = String::from_utf8(decoded) else {
        return bad_request();
    };
    let patch = match GateConfigPatch::from_json(&payload) {
        Ok(patch) => patch,
        Err(e) => {
            warn!(error = %e, "rejected config payload");
            return bad_request();
        }
    };
    match ctx.runtime().apply_gate_patch(&patch) {
        Ok(()) => ok_result(),
        Err(e) => {
            warn!(error = %e, "rejected config update");
            bad_request()
        }
    }
}

async fn device_list_handler() -> Response {
    let result = tokio::task::spawn_blocking(audio::list_input_devices).await;
    match result {
        Ok(Ok(devices)) => Json(json!({"audio_input_device_list": devices})).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "device enumeration failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Device enumeration failed").into_response()
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Device enumeration failed").into_response(),
    }
}

async fn asset_handler(State(ctx): State<Arc<WebContext>>, uri: Uri) -> Response {
    let name = uri.path().trim_start_matches('/');
    match ctx.assets.get(name) {
        Some(page) => Html(page.to_vec()).into_response(),
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
