use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// CORS for the SPA. The session travels in a cookie, so credentials are
/// always allowed and the origin is never the `*` wildcard.
pub fn create_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true);

    if allowed_origins.iter().any(|o| o == "*") {
        tracing::debug!("CORS: mirroring request origin");
        return base.allow_origin(AllowOrigin::mirror_request());
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "CORS: ignoring invalid origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS: no valid origins configured, cross-origin requests are refused");
    }
    base.allow_origin(origins)
}
