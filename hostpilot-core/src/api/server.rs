//! HTTP-серверы control-plane.
//!
//! Управляющий API закрыт pre-shared ключом; публичный монитор отдаёт
//! только метрики и не требует аутентификации. Оба сервиса отвечают
//! JSON-ом и разрешают CORS-запросы с любого источника.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::api::auth::require_api_key;
use crate::config::Config;
use crate::control::{ServiceAction, ServiceManager};
use crate::error::ApiError;
use crate::metrics::{MetricsSample, MetricsSampler};

/// Общее состояние обоих HTTP-сервисов.
#[derive(Clone)]
pub struct ApiState {
    /// Конфигурация, собранная один раз при старте процесса.
    pub config: Arc<Config>,
    /// Сэмплер метрик хоста.
    pub sampler: MetricsSampler,
    /// Менеджер управляемого юнита.
    pub service: Arc<ServiceManager>,
}

impl ApiState {
    /// Состояние с продакшен-компонентами поверх конфигурации.
    pub fn new(config: Arc<Config>) -> Self {
        let service = Arc::new(ServiceManager::new(&config.service_unit));
        Self {
            config,
            sampler: MetricsSampler::new(),
            service,
        }
    }

    /// Состояние из готовых компонентов (тесты подставляют сюда
    /// детерминированный сэмплер и обезвреженный менеджер).
    pub fn with_parts(
        config: Arc<Config>,
        sampler: MetricsSampler,
        service: Arc<ServiceManager>,
    ) -> Self {
        Self {
            config,
            sampler,
            service,
        }
    }
}

/// Обработчик `/health`: живость сервиса, без аутентификации.
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "hostpilot"
    }))
}

/// Обработчик метрик: один независимый снимок на каждый запрос.
///
/// Ошибка сбора превращается в 500 с общим текстом ([`ApiError`]);
/// частичных метрик в теле ответа не бывает.
async fn metrics_handler(State(state): State<ApiState>) -> Result<Json<MetricsSample>, ApiError> {
    let sample = state.sampler.sample().await?;
    Ok(Json(sample))
}

/// Отправляет команду юниту и сразу подтверждает приём.
///
/// Контракт fire-and-forget: ответ не зависит от исхода команды, сбой
/// отправки попадает только в логи.
fn dispatch_and_ack(state: &ApiState, action: ServiceAction) -> Json<Value> {
    if let Err(e) = state.service.dispatch(action) {
        warn!(
            unit = state.service.unit(),
            action = action.verb(),
            error = %e,
            "failed to dispatch service command"
        );
    }
    Json(json!({
        "status": format!("{} {}...", state.service.unit(), action.progress())
    }))
}

async fn service_start_handler(State(state): State<ApiState>) -> Json<Value> {
    dispatch_and_ack(&state, ServiceAction::Start)
}

async fn service_restart_handler(State(state): State<ApiState>) -> Json<Value> {
    dispatch_and_ack(&state, ServiceAction::Restart)
}

async fn service_stop_handler(State(state): State<ApiState>) -> Json<Value> {
    dispatch_and_ack(&state, ServiceAction::Stop)
}

/// Обработчик статуса юнита: разбирает active-state менеджера сервисов.
///
/// Недоступность менеджера не отличается для клиента от остановленного
/// юнита: оба случая дают текст «не работает».
async fn service_status_handler(State(state): State<ApiState>) -> Json<Value> {
    let unit = state.service.unit();
    let text = match state.service.status().await {
        Ok(active_state) if active_state.is_running() => format!("{unit} is running."),
        Ok(_) => format!("{unit} is not running or has encountered an error."),
        Err(e) => {
            warn!(unit = unit, error = %e, "failed to query service status");
            format!("{unit} is not running or has encountered an error.")
        }
    };
    Json(json!({ "status": text }))
}

/// Обработчик перезагрузки хоста: fire-and-forget, как и команды юниту.
async fn reboot_handler(State(state): State<ApiState>) -> Json<Value> {
    if let Err(e) = state.service.reboot_host() {
        warn!(error = %e, "failed to dispatch host reboot");
    }
    Json(json!({ "status": "Rebooting..." }))
}

/// Роутер управляющего API: все рабочие маршруты за проверкой ключа,
/// `/health` открыт.
fn control_router(state: ApiState) -> Router {
    Router::new()
        .route("/system/metrics", get(metrics_handler))
        .route("/service/start", post(service_start_handler))
        .route("/service/restart", post(service_restart_handler))
        .route("/service/stop", post(service_stop_handler))
        .route("/service/status", post(service_status_handler))
        .route("/system/reboot", post(reboot_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Роутер публичного монитора: только метрики и `/health`.
fn monitor_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP-сервер одного из сервисов control-plane.
///
/// Сервер запускается в фоновой задаче; handle позволяет узнать фактический
/// адрес (удобно при bind на порт 0) и корректно остановить сервер.
///
/// # Примеры использования
///
/// ```no_run
/// use std::sync::Arc;
/// use hostpilot_core::api::{ApiServer, ApiState};
/// use hostpilot_core::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Arc::new(Config::from_env()?);
/// let state = ApiState::new(Arc::clone(&config));
/// let handle = ApiServer::control(&config, state).start().await?;
///
/// // Сервер работает в фоне
/// // ...
///
/// handle.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct ApiServer {
    addr: std::net::SocketAddr,
    name: &'static str,
    router: Router,
}

impl ApiServer {
    /// Аутентифицированный управляющий API на адресе из конфигурации.
    pub fn control(config: &Config, state: ApiState) -> Self {
        Self {
            addr: config.control_addr,
            name: "control API",
            router: control_router(state),
        }
    }

    /// Публичный монитор на адресе из конфигурации.
    pub fn monitor(config: &Config, state: ApiState) -> Self {
        Self {
            addr: config.monitor_addr,
            name: "public monitor",
            router: monitor_router(state),
        }
    }

    /// Запускает сервер в фоновой задаче.
    ///
    /// # Ошибки
    ///
    /// Возвращает ошибку, если не удалось занять адрес.
    pub async fn start(self) -> Result<ApiServerHandle> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("failed to bind {} to {}", self.name, self.addr))?;
        let local_addr = listener
            .local_addr()
            .with_context(|| format!("failed to read local address of {}", self.name))?;

        info!("{} listening on http://{}", self.name, local_addr);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let name = self.name;
        let server = axum::serve(listener, self.router);

        tokio::spawn(async move {
            let graceful = server.with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });

            if let Err(e) = graceful.await {
                error!("{name} error: {e}");
            } else {
                info!("{name} stopped");
            }
        });

        Ok(ApiServerHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

/// Handle запущенного сервера: фактический адрес и остановка.
pub struct ApiServerHandle {
    local_addr: std::net::SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl ApiServerHandle {
    /// Фактический адрес, на котором слушает сервер.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Останавливает сервер.
    ///
    /// # Ошибки
    ///
    /// Возвращает ошибку, если сервер уже остановлен.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            tx.send(()).map_err(|_| {
                anyhow::anyhow!("failed to send shutdown signal (server task already gone)")
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{HostProbe, HostReading, MetricsUnavailable};
    use std::time::Duration;

    struct StaticProbe(HostReading);

    impl HostProbe for StaticProbe {
        fn read(&self, _window: Duration) -> Result<HostReading, MetricsUnavailable> {
            Ok(self.0)
        }
    }

    fn test_state() -> ApiState {
        let config = Arc::new(
            Config::from_lookup(|name| match name {
                "API_KEY" => Some("secret".to_string()),
                "SERVER_PORT" | "MONITOR_PORT" => Some("0".to_string()),
                _ => None,
            })
            .expect("test config"),
        );
        let sampler = MetricsSampler::with_probe(Arc::new(StaticProbe(HostReading {
            cpu_percent: 20.0,
            mem_used_bytes: 4 << 30,
            mem_total_bytes: 8 << 30,
        })));
        let service = Arc::new(ServiceManager::new("dummy").with_systemctl("/bin/true"));
        ApiState::with_parts(config, sampler, service)
    }

    #[tokio::test]
    async fn health_handler_reports_ok() {
        let Json(value) = health_handler().await;
        assert_eq!(value["status"], "ok");
        assert_eq!(value["service"], "hostpilot");
    }

    #[tokio::test]
    async fn metrics_handler_returns_sample() {
        let Json(sample) = metrics_handler(State(test_state())).await.expect("sample");
        assert_eq!(sample.cpu_percent, 20.0);
        assert_eq!(sample.temp_c, 33);
        assert_eq!(sample.gpu_percent, 10);
    }

    #[tokio::test]
    async fn dispatch_handlers_ack_immediately() {
        let Json(value) = service_start_handler(State(test_state())).await;
        assert_eq!(value["status"], "dummy starting...");

        let Json(value) = service_restart_handler(State(test_state())).await;
        assert_eq!(value["status"], "dummy restarting...");

        let Json(value) = service_stop_handler(State(test_state())).await;
        assert_eq!(value["status"], "dummy stopping...");
    }

    #[tokio::test]
    async fn dispatch_handlers_ack_even_when_spawn_fails() {
        let state = test_state();
        let state = ApiState::with_parts(
            state.config,
            state.sampler,
            Arc::new(ServiceManager::new("dummy").with_systemctl("/nonexistent/systemctl")),
        );
        let Json(value) = service_start_handler(State(state)).await;
        assert_eq!(value["status"], "dummy starting...");
    }

    #[tokio::test]
    async fn status_handler_treats_unreadable_manager_as_not_running() {
        let state = test_state();
        let state = ApiState::with_parts(
            state.config,
            state.sampler,
            Arc::new(ServiceManager::new("dummy").with_systemctl("/nonexistent/systemctl")),
        );
        let Json(value) = service_status_handler(State(state)).await;
        assert_eq!(
            value["status"],
            "dummy is not running or has encountered an error."
        );
    }

    #[tokio::test]
    async fn server_start_and_shutdown() {
        let state = test_state();
        let config = Arc::clone(&state.config);
        let handle = ApiServer::control(&config, state)
            .start()
            .await
            .expect("start");
        assert_ne!(handle.local_addr().port(), 0);
        handle.shutdown().await.expect("shutdown");
    }
}
