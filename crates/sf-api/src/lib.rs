//! # sf-api
//!
//! The web routing and orchestration layer for study-forum.

pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;

use std::sync::Arc;

use actix_web::middleware::from_fn;
use actix_web::web;
use sf_services::ForumServices;

use crate::metrics::ApiMetrics;
use crate::rate_limit::{RateLimitConfig, RateLimiter};

/// State shared across all Actix-web workers.
pub struct AppState {
    pub services: ForumServices,
    pub metrics: Arc<ApiMetrics>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(services: ForumServices) -> Self {
        Self::with_rate_limit(services, RateLimitConfig::default())
    }

    pub fn with_rate_limit(services: ForumServices, limit: RateLimitConfig) -> Self {
        Self {
            services,
            metrics: Arc::new(ApiMetrics::new()),
            rate_limiter: Arc::new(RateLimiter::new(limit)),
        }
    }
}

/// Configures the forum routes.
///
/// # Developer Note
/// Everything except `/metrics` lives under `/api`, which is rate limited per
/// client address. Routes that take a [`identity::CurrentUser`] reject
/// requests without a valid `X-User-Id`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(handlers::json_error))
        .app_data(web::QueryConfig::default().error_handler(handlers::query_error))
        .route("/metrics", web::get().to(handlers::metrics))
        .service(
            web::scope("/api")
                .wrap(from_fn(rate_limit::limit_requests))
                .route("/health", web::get().to(handlers::health))
                .route("/stats", web::get().to(handlers::stats))
                .route("/users", web::post().to(handlers::register_user))
                .route("/users/me", web::get().to(handlers::current_user))
                .service(
                    web::scope("/threads")
                        .route("", web::get().to(handlers::list_threads))
                        .route("", web::post().to(handlers::create_thread))
                        .route("/{id}", web::get().to(handlers::get_thread))
                        .route("/{id}/vote", web::put().to(handlers::vote_thread))
                        .route("/{id}/ai", web::get().to(handlers::ai_status))
                        .route("/{id}/ai", web::post().to(handlers::request_ai_answer))
                        .route("/{id}/ai", web::delete().to(handlers::cancel_ai_answer)),
                )
                .service(
                    web::scope("/replies")
                        .route("", web::post().to(handlers::create_reply))
                        .route("/thread/{thread_id}", web::get().to(handlers::list_replies))
                        .route("/{id}", web::put().to(handlers::edit_reply))
                        .route("/{id}", web::delete().to(handlers::delete_reply))
                        .route("/{id}/vote", web::put().to(handlers::vote_reply))
                        .route("/{id}/accept", web::put().to(handlers::accept_reply)),
                ),
        );
}
