//! Ошибки, видимые на границе HTTP API.
//!
//! Клиент получает только общий текст и код статуса; детали исходной
//! ошибки остаются в серверных логах.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::metrics::MetricsUnavailable;

/// Ошибка обработки запроса.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Предъявленный ключ не совпал с настроенным секретом.
    #[error("invalid API key")]
    AuthFailure,
    /// Не удалось собрать системные метрики.
    #[error("failed to collect system metrics")]
    MetricsUnavailable(#[from] MetricsUnavailable),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthFailure => StatusCode::FORBIDDEN,
            ApiError::MetricsUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Общий текст для клиента, без деталей и без подсказок о секрете.
    fn client_message(&self) -> &'static str {
        match self {
            ApiError::AuthFailure => "Invalid API key",
            ApiError::MetricsUnavailable(_) => "Failed to collect system metrics",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::MetricsUnavailable(source) = &self {
            error!(error = ?source, "metrics collection failed");
        }
        (
            self.status(),
            Json(json!({ "error": self.client_message() })),
        )
            .into_response()
    }
}
