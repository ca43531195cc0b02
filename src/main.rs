use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ragline::{config::Config, run_retention_cron, run_worker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ragline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("starting ragline server on {}:{}", config.host, config.port);

    let (router, state) = ragline::create_app_with_state(config.clone()).await?;

    for _ in 0..config.queue_workers {
        let worker_state = state.clone();
        tokio::spawn(run_worker(worker_state));
    }
    tokio::spawn(run_retention_cron(state.clone()));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;
    tracing::info!("ragline server listening on http://{}:{}", config.host, config.port);

    axum::serve(listener, router).await?;

    Ok(())
}
