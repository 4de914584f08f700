mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use cpdb_collector::CollectorError;
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, rate_limit_state, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = cpdb_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = cpdb_db::PoolConfig::from_app_config(&config);
    let pool = cpdb_db::connect_pool(&config.database_url, pool_config).await?;
    cpdb_db::run_migrations(&pool).await?;

    let collector = match cpdb_collector::build_scheduler(pool.clone(), &config) {
        Ok(collector) => Some(Arc::new(collector)),
        Err(CollectorError::Config(reason)) => {
            tracing::warn!(%reason, "collection disabled");
            None
        }
        Err(e) => return Err(e.into()),
    };

    let _scheduler =
        scheduler::build_scheduler(pool.clone(), collector.clone(), &config.collect_cron).await?;

    let state = AppState::new(pool, &config.collector, collector);
    let app = build_app(state, rate_limit_state(config.api_rate_limit_per_min));

    tracing::info!(addr = %config.bind_addr, env = %config.env, "starting server");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
