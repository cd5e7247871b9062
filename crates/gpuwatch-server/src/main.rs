mod args;
mod config;
mod handlers;
mod state;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use gpuwatch_monitor::{MonitorMetrics, Scheduler, SnapshotCache};
use gpuwatch_remote::SshConnector;

use crate::args::Args;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let otel_provider = gpuwatch_common::telemetry::init_tracing(
        "gpuwatch-server",
        args.otlp_endpoint.as_deref(),
        args.otlp_token.as_deref(),
        &args.log_format,
    );

    let hosts = config::load_hosts(&args.hosts_file)?;
    tracing::info!(hosts_file=%args.hosts_file, hosts = hosts.len(), "loaded host registry");

    let cache = Arc::new(SnapshotCache::new());
    let metrics = Arc::new(MonitorMetrics::default());
    let shutdown = CancellationToken::new();

    let mut pool = None;
    let mut scheduler_task = None;
    if hosts.is_empty() {
        tracing::warn!(hosts_file=%args.hosts_file, "no hosts configured, monitor disabled");
    } else {
        let connector = Arc::new(SshConnector::new(args.ssh_options()));
        let scheduler = Scheduler::new(
            hosts,
            connector,
            &args.monitor_config(),
            cache.clone(),
            metrics.clone(),
        )?;
        pool = Some(scheduler.pool());

        let token = shutdown.clone();
        scheduler_task = Some(tokio::spawn(async move { scheduler.run(token).await }));
    }

    let app = handlers::router(AppState {
        cache,
        metrics,
        pool,
    });

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    tracing::info!(listen_addr=%args.listen_addr, "serving");

    let serve_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            serve_token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            tracing::error!(error=%e, "scheduler task failed");
        }
    }

    if let Some(provider) = otel_provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush traces: {e}");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error=%e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error=%e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
