//! # study-forum Binary
//!
//! The entry point that assembles the application based on compile-time features.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use sf_api::middleware::{cors_policy, security_headers, standard_middleware};
use sf_api::rate_limit::RateLimitConfig;
use sf_api::{configure_routes, AppState};
use sf_config::{AiSettings, LogSettings, Settings};
use sf_core::traits::{ForumRepo, TextGenerator};
use sf_services::{AnswerGenerator, ForumServices, UnconfiguredGenerator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-sqlite")]
use sf_db_sqlite::SqliteForumRepo;

#[cfg(feature = "ai-gemini")]
use sf_ai_gemini::GeminiTextGenerator;

#[cfg(not(feature = "db-sqlite"))]
compile_error!("study-forum needs a storage backend; enable the `db-sqlite` feature");

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_repo(settings: &Settings) -> anyhow::Result<Arc<dyn ForumRepo>> {
    let repo = SqliteForumRepo::connect(&settings.database.url, settings.database.max_connections)
        .await
        .with_context(|| format!("opening database {}", settings.database.url))?;
    Ok(Arc::new(repo))
}

#[cfg(feature = "ai-gemini")]
fn configured_provider(ai: &AiSettings) -> Option<Arc<dyn TextGenerator>> {
    let key = ai.active_key()?;
    info!(model = %ai.model, "Gemini answer generation enabled");
    Some(Arc::new(GeminiTextGenerator::with_endpoint(key.clone(), &ai.base_url, &ai.model)))
}

#[cfg(not(feature = "ai-gemini"))]
fn configured_provider(_ai: &AiSettings) -> Option<Arc<dyn TextGenerator>> {
    None
}

/// Falls back to a generator that always fails, so AI replies never appear.
fn build_generator(ai: &AiSettings) -> Arc<dyn TextGenerator> {
    configured_provider(ai).unwrap_or_else(|| {
        if ai.enabled {
            warn!("no AI provider configured; AI replies are disabled");
        }
        Arc::new(UnconfiguredGenerator)
    })
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_tracing(&settings.log);
    if let Some(path) = &settings.env_file {
        info!(path = %path.display(), "environment file applied");
    }

    // 1. Initialize Database Implementation
    let repo = build_repo(&settings).await?;

    // 2. Initialize AI Implementation
    let generator = AnswerGenerator::new(build_generator(&settings.ai), settings.ai.timeout());

    // 3. Wrap in AppState
    let limit = RateLimitConfig { requests: settings.rate_limit.requests, window: settings.rate_limit.window() };
    let state = web::Data::new(AppState::with_rate_limit(ForumServices::new(repo, generator), limit));

    let cors_origin = settings.server.cors_origin.clone();
    let bind = (settings.server.host.clone(), settings.server.port);
    info!(host = %bind.0, port = bind.1, "study-forum starting");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors_policy(cors_origin.as_deref()))
            .wrap(security_headers())
            .wrap(standard_middleware())
            .configure(configure_routes)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
