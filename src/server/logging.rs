use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

const LOG_TARGET: &str = "kvitlach::server::http";

/// Middleware logging each request on the plain-HTTP listener.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        target = LOG_TARGET,
        %method,
        %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "request completed"
    );
    response
}
