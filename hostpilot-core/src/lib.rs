//! hostpilot-core — удалённый control-plane одного хоста.
//!
//! Библиотека собирает системные метрики (CPU, память, приближённые
//! температура и загрузка GPU) и управляет одним systemd-юнитом через два
//! HTTP-сервиса: аутентифицированный управляющий API и публичный монитор.

pub mod api;
pub mod config;
pub mod control;
pub mod error;
pub mod metrics;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use crate::api::{ApiServer, ApiState};
use crate::config::Config;

/// Callback для уведомления о готовности (например, systemd notify).
pub type ReadyCallback = Box<dyn Fn() + Send + Sync>;

/// Callback для обновления статуса (например, systemd notify).
pub type StatusCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Запускает оба HTTP-сервиса и работает до сигнала в канале `shutdown`.
///
/// Управляющий API поднимается всегда; публичный монитор — только при
/// `enable_monitor`. Callback `on_ready` вызывается после того, как все
/// слушатели заняли свои адреса, `on_status` — при смене фазы работы.
/// По сигналу оба сервера останавливаются корректно (graceful shutdown).
pub async fn run_control_plane(
    config: Config,
    enable_monitor: bool,
    mut shutdown: watch::Receiver<()>,
    on_ready: Option<ReadyCallback>,
    on_status: Option<StatusCallback>,
) -> Result<()> {
    let config = Arc::new(config);
    let state = ApiState::new(Arc::clone(&config));

    let control = ApiServer::control(&config, state.clone()).start().await?;
    let monitor = if enable_monitor {
        Some(ApiServer::monitor(&config, state).start().await?)
    } else {
        None
    };

    if let Some(ready) = &on_ready {
        ready();
    }
    if let Some(status) = &on_status {
        status(&format!("Serving control API on {}", control.local_addr()));
    }
    info!(
        unit = %config.service_unit,
        control = %control.local_addr(),
        monitor = ?monitor.as_ref().map(|handle| handle.local_addr()),
        "hostpilot is serving"
    );

    let _ = shutdown.changed().await;
    if let Some(status) = &on_status {
        status("Stopping HTTP servers");
    }
    info!("shutdown requested, stopping HTTP servers");

    control.shutdown().await?;
    if let Some(handle) = monitor {
        handle.shutdown().await?;
    }
    Ok(())
}
