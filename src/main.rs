// Web server entry point
use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use candle::Device;
use env_logger::Env;
use log::info;
use sentiment_server::api;
use sentiment_server::config::ServerConfig;
use sentiment_server::models::DistilBertSentimentModel;
use sentiment_server::state::AppState;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env()?;
    info!(
        "starting sentiment server: model={} revision={} bind={}:{}",
        config.model.model_id, config.model.revision, config.host, config.port
    );

    // Load failures end the process before anything is served.
    let model = DistilBertSentimentModel::load_from_hub(&config.model, Device::Cpu)?;
    let state = web::Data::new(AppState::new(Arc::new(model)));

    let max_body_bytes = config.max_body_bytes;
    let cors_origin = config.cors_allowed_origin.clone();
    let mut server = HttpServer::new(move || {
        let cors = match &cors_origin {
            Some(origin) => Cors::default().allowed_origin(origin),
            None => Cors::default().allow_any_origin(),
        }
        .allowed_methods(vec!["GET", "POST"])
        .allow_any_header();

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(|cfg| api::configure(cfg, max_body_bytes))
    });
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    info!("listening on {}:{}", config.host, config.port);
    server
        .bind((config.host.as_str(), config.port))?
        .run()
        .await?;

    Ok(())
}
