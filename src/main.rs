use pagebuilder::config::{ConfigError, ServerConfig};
use pagebuilder::services::component::{self, ComponentError};
use pagebuilder::{db, routes, state};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database init failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("component seeding failed: {0}")]
    Seed(#[from] ComponentError),
    #[error("server io: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env()?;
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;

    if config.seed_components {
        let seeded = component::seed_components_if_empty(&pool).await?;
        if seeded > 0 {
            tracing::info!(count = seeded, "seeded default components");
        }
    }

    let port = config.port;
    if config.dev_login_enabled {
        tracing::warn!("dev login enabled");
    }
    let app = routes::app(state::AppState::new(pool, config));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "pagebuilder listening");
    axum::serve(listener, app).await?;
    Ok(())
}
