// src/main.rs
mod cache;
mod config;
mod directory;
mod handlers;
mod models;
mod probe;
mod search;
mod utils;

use actix_web::{web, App, HttpServer};
use env_logger::Env;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{clock::DefaultClock, RateLimiter};
use log::info;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::directory::web::WebDirectory;
use crate::directory::worker::{spawn_session_worker, SessionState};
use crate::directory::DirectorySession;
use crate::search::{CachedProber, SearchService, ServerProber};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger only once at the start
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    dotenv::dotenv().ok();
    let config = Config::from_env();

    // Get bind address and port from environment or use defaults
    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind = format!("{}:{}", bind_address, port);

    let directory: Arc<dyn DirectorySession> =
        Arc::new(WebDirectory::new(config.directory_url.clone()));
    let session = Arc::new(SessionState::new());
    spawn_session_worker(
        directory.clone(),
        session.clone(),
        Duration::from_secs(config.heartbeat_period_secs),
    );

    let prober: Arc<dyn ServerProber> = Arc::new(CachedProber::new(config.clone()));
    let service = web::Data::new(SearchService::new(
        directory,
        session.clone(),
        prober,
        &config,
    ));
    let session_state = web::Data::from(session);

    // Set up per-route rate limiters using config
    let search_rate_limiter: web::Data<
        RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>,
    > = web::Data::new(RateLimiter::keyed(config.search_quota()));

    let info_rate_limiter: web::Data<
        RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>,
    > = web::Data::new(RateLimiter::keyed(config.info_quota()));

    info!("Starting query gateway on {}", bind);
    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(session_state.clone())
            .service(
                web::resource("/server/search")
                    .app_data(search_rate_limiter.clone())
                    .route(web::get().to(handlers::servers::search_servers)),
            )
            .service(
                web::resource("/server/info")
                    .app_data(info_rate_limiter.clone())
                    .route(web::get().to(handlers::servers::server_info)),
            )
            .route("/health", web::get().to(handlers::health::health))
    })
    .bind(&bind)?
    .run()
    .await
}
