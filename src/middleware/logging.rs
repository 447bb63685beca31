use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn create_logging_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG))
}

/// Logs each request with a correlation id, which is echoed back in the
/// `x-request-id` response header. A client-supplied id is reused.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis();
    if status.is_server_error() {
        tracing::error!(request_id = %request_id, method = %method, path = %path, status = %status, elapsed_ms, "request failed");
    } else {
        tracing::info!(request_id = %request_id, method = %method, path = %path, status = %status, elapsed_ms, "request completed");
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

fn parse_level(log_level: &str) -> Option<Level> {
    match log_level.trim().to_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" | "WARNING" => Some(Level::WARN),
        "ERROR" => Some(Level::ERROR),
        _ => None,
    }
}

/// Install the global subscriber. The configured level applies to this
/// crate; framework crates stay quieter.
pub fn init_logging(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    let level = parse_level(log_level).unwrap_or_else(|| {
        eprintln!("Invalid log level '{}', defaulting to INFO", log_level);
        Level::INFO
    });

    let env_filter = tracing_subscriber::EnvFilter::new(format!(
        "helpdesk_backend={},tower_http=info,sqlx=warn",
        level
    ));
    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format.eq_ignore_ascii_case("plain") {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()?;
    }

    tracing::info!(log_level = %level, log_format = %log_format, "logging initialized");
    Ok(())
}
