use std::sync::Arc;

use anyhow::Context as _;

use looma_infra::{AppConfig, InMemoryStore, PostgresStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    looma_observability::init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    if config.insecure_dev_secret {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let store: Arc<dyn Store> = match &config.database {
        Some(db) => Arc::new(
            PostgresStore::connect(db)
                .await
                .context("failed to connect to postgres")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on exit");
            Arc::new(InMemoryStore::new())
        }
    };

    let app = looma_api::app::build_app(&config, store);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
