use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::platform::groupme::GroupMeCallback;
use crate::platform::slack::SlackOutgoing;
use crate::relay::{Outcome, Relay, RelayError};

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            RelayError::QueueClosed => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::UnknownRoom
            | RelayError::InvalidCredential
            | RelayError::EmptyMessage
            | RelayError::MalformedRequest => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

fn respond(result: Result<Outcome, RelayError>) -> Response {
    match result {
        Ok(outcome) => (StatusCode::OK, outcome.message()).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Decode a webhook body as JSON or as a urlencoded form, following its
/// Content-Type. Both platforms' webhooks are accepted on either route.
async fn decode<T: DeserializeOwned>(request: Request) -> Result<T, RelayError> {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let decoded = if is_json {
        Json::<T>::from_request(request, &())
            .await
            .map(|Json(body)| body)
            .map_err(|rejection| rejection.body_text())
    } else {
        Form::<T>::from_request(request, &())
            .await
            .map(|Form(body)| body)
            .map_err(|rejection| rejection.body_text())
    };

    decoded.map_err(|reason| {
        warn!("Rejecting inbound webhook body: {}", reason);
        RelayError::MalformedRequest
    })
}

async fn groupme_inbound(State(relay): State<Arc<Relay>>, request: Request) -> Response {
    respond(
        decode::<GroupMeCallback>(request)
            .await
            .and_then(|callback| relay.from_groupme(callback)),
    )
}

async fn slack_inbound(State(relay): State<Arc<Relay>>, request: Request) -> Response {
    respond(
        decode::<SlackOutgoing>(request)
            .await
            .and_then(|outgoing| relay.from_slack(outgoing)),
    )
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/groupme", post(groupme_inbound))
        .route("/platformA-inbound", post(groupme_inbound))
        .route("/slack", post(slack_inbound))
        .route("/platformB-inbound", post(slack_inbound))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}

/// Serve the inbound webhooks until Ctrl-C or SIGTERM.
pub async fn serve(addr: &str, relay: Arc<Relay>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Server listening on http://{}/", listener.local_addr()?);

    axum::serve(listener, router(relay))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
