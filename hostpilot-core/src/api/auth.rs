//! Проверка pre-shared ключа для управляющего API.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::server::ApiState;
use crate::error::ApiError;

/// Пропускает запрос дальше только при точном совпадении ключа из
/// настроенного заголовка с секретом. Имя заголовка задаётся конфигом
/// (`API_KEY_NAME`); отсутствие заголовка равнозначно неверному ключу.
pub async fn require_api_key(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(state.config.api_key_name.as_str())
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(key) if key == state.config.api_key => Ok(next.run(request).await),
        _ => Err(ApiError::AuthFailure),
    }
}
