use anyhow::Context;
use rosterbid::orchestration::Scheduler;
use rosterbid::{
    api, config::Config, db::init_db, GameConfigProvider, GameId, HttpGameConfigProvider,
    Repository,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("Failed to initialize database at {}", config.database_path))?;

    let repo = Arc::new(Repository::new(pool));
    let provider: Arc<dyn GameConfigProvider> =
        Arc::new(HttpGameConfigProvider::new(config.game_config_url.clone()));
    let state = api::AppState::new(repo.clone(), provider, config.clone());

    if !config.scheduled_games.is_empty() {
        let scheduler = Scheduler::new(repo, state.controller.clone(), state.finalizer.clone());
        let games = config.scheduled_games.iter().map(GameId::new).collect();
        let interval = Duration::from_millis(config.scheduler_interval_ms);
        tokio::spawn(scheduler.run(games, interval));
    }

    let app = api::create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
