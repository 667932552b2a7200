//! study-forum/crates/sf-api/src/middleware.rs Middleware
//!
//! Access logging, security headers and CORS for the forum API.

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};

use crate::identity::USER_ID_HEADER;

/// Access log line per request, emitted through the `log` facade into `tracing`.
pub fn standard_middleware() -> Logger {
    Logger::new(r#"%a "%r" %s %b %Dms "%{User-Agent}i""#).exclude("/api/health")
}

/// Response headers applied to every route.
pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .add((header::REFERRER_POLICY, "no-referrer"))
        .add((header::X_FRAME_OPTIONS, "DENY"))
}

/// A configured origin is the only one allowed; no origin means any.
pub fn cors_policy(origin: Option<&str>) -> Cors {
    let cors = match origin {
        Some(origin) => Cors::default().allowed_origin(origin),
        None => Cors::default().allow_any_origin(),
    };
    cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
        .allowed_header(USER_ID_HEADER)
        .max_age(3600)
}
