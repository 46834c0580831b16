use crate::auth::TokenValidator;
use crate::config::Config;
use crate::dispatcher::dispatch;
use crate::error::GateError;
use crate::gate::check_action;
use crate::models::{ApiResponse, Operation};
use actix_web::http::Method;
use actix_web::{get, web, HttpRequest, HttpResponse};
use futures::StreamExt;
use log::{debug, info, warn};
use serde_json::json;
use std::time::Instant;

pub const OPERATION_PATH: &str = "/api/operation";
pub const CLIENT_ID_HEADER: &str = "X-Client-ID";

/// Read-only state shared by every worker.
pub struct AppState {
    pub config: Config,
    pub validator: TokenValidator,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(connect)
        .route(OPERATION_PATH, web::route().to(operation));
}

#[get("/api/connect")]
pub async fn connect() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(json!(true)))
}

/// The operation pipeline. Stages run in a fixed order and stop at the first
/// failure: method, authentication, body decoding, action allowlist, then the
/// per-target checks inside dispatch.
pub async fn operation(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GateError> {
    let start_time = Instant::now();
    let client_id = req
        .headers()
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    if req.method() != Method::POST {
        warn!("Rejected {} {} from client '{}'", req.method(), req.path(), client_id);
        return Err(GateError::MethodNotAllowed);
    }

    let claims = state
        .validator
        .authenticate(req.headers())
        .map_err(|e| reject("authentication", &client_id, e))?;
    let subject = claims.sub.unwrap_or_else(|| "-".to_string());
    debug!("Authenticated subject '{}' (token expires at {})", subject, claims.exp);

    let body = read_body(payload, state.config.max_body_size())
        .await
        .map_err(|e| reject("body", &client_id, e))?;
    let op: Operation = serde_json::from_slice(&body).map_err(|e| {
        debug!("Undecodable operation body: {}", e);
        reject(
            "decode",
            &client_id,
            GateError::BadRequest("Invalid request format".to_string()),
        )
    })?;

    info!(
        "Operation '{}' from client '{}' (subject '{}', sent {})",
        op.action,
        client_id,
        subject,
        op.timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    );

    check_action(&state.config, &op.action).map_err(|e| reject("action", &client_id, e))?;

    let data = dispatch(&state.config, &op)
        .await
        .map_err(|e| reject(&op.action, &client_id, e))?;

    info!(
        "Operation '{}' for client '{}' completed in {:.2?}.",
        op.action,
        client_id,
        start_time.elapsed()
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

fn reject(stage: &str, client_id: &str, err: GateError) -> GateError {
    warn!("Request from client '{}' rejected at {}: {}", client_id, stage, err);
    err
}

async fn read_body(mut payload: web::Payload, limit: usize) -> Result<web::BytesMut, GateError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk
            .map_err(|e| GateError::BadRequest(format!("failed to read request body: {}", e)))?;
        if body.len() + chunk.len() > limit {
            return Err(GateError::PayloadTooLarge {
                limit: limit as u64,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
