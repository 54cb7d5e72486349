use anyhow::Result;
use clap::Parser;
use hostpilot_core::{config::Config, run_control_plane, ReadyCallback, StatusCallback};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod systemd;

#[derive(Parser, Debug)]
#[command(name = "hostpilotd", about = "Remote host control-plane daemon")]
struct Args {
    /// Не поднимать публичный монитор (сервис без аутентификации)
    #[arg(long)]
    no_monitor: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    tracing::info!(
        "Starting hostpilot daemon (monitor = {})",
        !args.no_monitor
    );

    // Канал для graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Задача для обработки сигналов завершения
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        tracing::info!("Received SIGINT/SIGTERM, initiating graceful shutdown");
        let _ = shutdown_tx_clone.send(());
    });

    let on_ready: ReadyCallback = Box::new(|| {
        if let Err(e) = systemd::notify_ready() {
            // Вне systemd уведомление не доставляется, это штатно
            tracing::debug!("systemd READY notification skipped: {e}");
        }
    });
    let on_status: StatusCallback = Box::new(|status| systemd::notify_status(status));

    let result = run_control_plane(
        config,
        !args.no_monitor,
        shutdown_rx,
        Some(on_ready),
        Some(on_status),
    )
    .await;

    systemd::notify_stopping();
    result
}
