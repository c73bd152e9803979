pub mod auth;
pub mod error_handling;
pub mod guards;

use crate::state::AppState;
use axum::http;
use axum::Router;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Default layers for the whole router: one INFO span per request carrying
/// a generated request id, so a websocket handshake and the HTTP calls of
/// the same client can be told apart in the logs. Status and latency are
/// logged on completion.
pub fn with_defaults(router: Router<AppState>) -> Router<AppState> {
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &http::Request<_>| {
                tracing::info_span!(
                    "request",
                    request_id = %Uuid::new_v4(),
                    method = %req.method(),
                    path = %req.uri().path(),
                )
            })
            .on_response(
                |res: &http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    tracing::info!(
                        status = res.status().as_u16(),
                        elapsed_ms = latency.as_millis() as u64,
                        "request completed"
                    );
                },
            ),
    )
}
