//Third-party-dependencies
use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{rt, web, App, HttpServer};
use chrono::{Duration as ChronoDuration, Utc};
use log::{info, warn};
use std::io;
use std::time::Duration;

use tabula_service::config::Config;
use tabula_service::routes;
use tabula_service::state::AppState;

const SWEEP_INTERVAL_SECS: u64 = 300;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.storage_dir)?;

    let address = config.bind_address.clone();
    let cors_origin = config.cors_allowed_origin.clone();

    let state = AppState::from_config(config)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    let state = web::Data::new(state);

    // sweep uploads that were never confirmed or abandoned, and files whose
    // processing never reported back; the first tick runs at startup
    let uploads = state.uploads.clone();
    let files = state.files.clone();
    let processing_timeout = ChronoDuration::seconds(state.config.processing_timeout_secs);
    rt::spawn(async move {
        let mut interval = rt::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(e) = uploads.purge_stale_uploads(Utc::now()).await {
                warn!("⚠️ Stale upload sweep failed: {}", e);
            }
            if let Err(e) = files.recover_stalled_processing(Utc::now(), processing_timeout) {
                warn!("⚠️ Stalled processing sweep failed: {}", e);
            }
        }
    });

    info!("🚀 Server started at {}", address);

    HttpServer::new(move || {
        let cors = match &cors_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header()
                .supports_credentials(),
            None => Cors::permissive(),
        };

        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(routes::init_routes)
    })
    .bind(address)?
    .run()
    .await
}
