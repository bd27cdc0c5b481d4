use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpServer};
use std::io;
use tracing_subscriber::EnvFilter;

mod backend;
mod config;
mod database;
mod error;
mod models;
mod response;
mod routes;
mod utils;

use crate::{
    backend::BackendClient, config::Config, error::ApiError, models::user::UserAuthenticationMiddlewareFactory,
};

fn cors(origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .supports_credentials()
        .max_age(3600);
    if origins.iter().any(|origin| origin == "*") {
        return cors.allow_any_origin();
    }
    origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cmms_server=debug")))
        .init();

    let config = Config::from_env().map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
    models::user::load_keys(&config.jwt_secret, config.jwt_expiry_hours);

    database::connect(&config.mongodb_uri, &config.database_name)
        .await
        .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;
    tracing::info!(database = %config.database_name, "connected to MongoDB");

    let client = BackendClient::new(&config.server_base_url, config.backend_timeout)
        .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;

    let bind = (config.host.clone(), config.port);
    tracing::info!(host = %bind.0, port = bind.1, backend = %config.server_base_url, "starting server");

    let config = web::Data::new(config);
    let client = web::Data::new(client);

    HttpServer::new(move || {
        App::new()
            .app_data(config.clone())
            .app_data(client.clone())
            .app_data(web::JsonConfig::default().error_handler(|error, _| ApiError::validation(error.to_string()).into()))
            .app_data(web::QueryConfig::default().error_handler(|error, _| ApiError::validation(error.to_string()).into()))
            .app_data(web::PathConfig::default().error_handler(|error, _| ApiError::validation(error.to_string()).into()))
            .wrap(UserAuthenticationMiddlewareFactory)
            .wrap(cors(&config.cors_origins))
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await
}
