#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for healthcare provider search.
//!
//! A thin JSON layer over [`SearchOrchestrator`]: every response is wrapped
//! in [`medlocate_server_models::ApiResponse`] and engine error kinds map to
//! HTTP statuses in one place.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use medlocate_search::{SearchConfig, SearchOrchestrator};

/// Shared application state.
pub struct AppState {
    /// The search engine.
    pub engine: Arc<SearchOrchestrator>,
}

/// Registers the `/api` routes and the JSON/query error handlers.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(handlers::json_error))
        .app_data(web::QueryConfig::default().error_handler(handlers::query_error))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(handlers::health))
                .route("/search", web::post().to(handlers::search))
                .route("/geocode", web::post().to(handlers::geocode))
                .route("/reverse-geocode", web::get().to(handlers::reverse_geocode))
                .route("/providers", web::get().to(handlers::providers))
                .route("/providers/{unique_id}", web::get().to(handlers::provider)),
        );
}

/// Serves the API for `engine` on `BIND_ADDR:PORT` (default
/// `127.0.0.1:8080`).
///
/// This is a regular async function; the caller provides the runtime
/// (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(engine: Arc<SearchOrchestrator>) -> std::io::Result<()> {
    let state = web::Data::new(AppState { engine });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

/// Loads configuration from the environment, builds the engine and serves
/// it.
///
/// # Errors
///
/// Returns an error if configuration is incomplete (e.g. a missing
/// credential), the engine cannot be built, or the server fails.
#[allow(clippy::future_not_send)]
pub async fn run_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let config = SearchConfig::from_env()?;
    let engine = medlocate_search::engine::from_config(&config)?;
    log::info!("Engine ready: {engine:?}");
    run_server(Arc::new(engine)).await?;
    Ok(())
}
