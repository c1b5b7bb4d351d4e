use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;

use dish_monitor::config::{Args, DaemonConfig};
use dish_monitor::dashboard;
use dish_monitor::dish_client::GrpcurlClient;
use dish_monitor::obstruction_log::ObstructionLog;
use dish_monitor::scheduler::{ScheduleConfig, Scheduler};
use dish_monitor::status::StatusService;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = DaemonConfig::from_args(args).context("invalid configuration")?;

    log::info!("[START] dish target {}", config.dish_target);
    log::info!(
        "[START] obstruction log {} (keeping {} samples)",
        config.obstruction_log_path.display(),
        config.max_samples
    );

    let client = GrpcurlClient::new(config.grpcurl.clone(), config.dish_target.clone(), config.dish_timeout);
    let service = Arc::new(StatusService::new(client));
    let log_store = Arc::new(ObstructionLog::new(config.obstruction_log_path.clone(), config.max_samples));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::new(
        Arc::clone(&service),
        log_store,
        ScheduleConfig::from_daemon(&config),
        Instant::now(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("[STOP] shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                log::warn!("[STOP] cannot listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    dashboard::serve(listener, dashboard::router(service), shutdown_rx).await?;

    scheduler_handle.await.context("scheduler task failed")?;
    log::info!("[STOP] stopped");
    Ok(())
}
