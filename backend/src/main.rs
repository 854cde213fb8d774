use anyhow::Result;

mod api;
mod config;
mod db;
mod display;
mod error;
mod headers;
mod prefetch;
mod schema;
mod setup;
mod state;
mod telemetry;
mod utils;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config::Config::load()?;
    let db = db::Db::connect(&config.database_url)?;
    let state = state::AppState::new(db, config)?;

    api::new_http_server(state).await?;
    Ok(())
}
