//! Интеграция с systemd через sd-notify.
//!
//! Демон сообщает systemd о своём состоянии:
//! - READY=1 — после того, как оба HTTP-слушателя заняли адреса;
//! - STATUS=... — текущая фаза работы (видна в `systemctl status hostpilotd`);
//! - STOPPING=1 — при начале остановки.
//!
//! Вне systemd уведомления не доставляются; это не ошибка демона.

use anyhow::{Context, Result};
use libsystemd::daemon::NotifyState;

/// Отправляет READY=1 после полной инициализации.
///
/// Возвращает ошибку, если уведомление не доставлено (обычно значит, что
/// процесс запущен не под systemd); её безопасно игнорировать.
pub fn notify_ready() -> Result<()> {
    let state = NotifyState::Ready;
    libsystemd::daemon::notify(false, &[state])
        .context("Failed to send READY notification to systemd")?;
    Ok(())
}

/// Обновляет STATUS=... демона.
///
/// Строка обрезается до ~200 символов; ошибки доставки игнорируются.
pub fn notify_status(status: &str) {
    let status_truncated = match status.char_indices().nth(200) {
        Some((idx, _)) => &status[..idx],
        None => status,
    };

    let state = NotifyState::Status(status_truncated.to_string());
    let _ = libsystemd::daemon::notify(false, &[state]);
}

/// Отправляет STOPPING=1 при начале остановки; ошибки доставки игнорируются.
pub fn notify_stopping() {
    let _ = libsystemd::daemon::notify(false, &[NotifyState::Stopping]);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Вне systemd notify_ready возвращает ошибку, но не паникует.
    #[test]
    fn test_notify_ready_no_panic() {
        let result = notify_ready();
        assert!(result.is_err() || result.is_ok());
    }

    /// notify_status не паникует на любых строках, включая длинные.
    #[test]
    fn test_notify_status_no_panic() {
        notify_status("Test status");

        // Длинный статус обрезается
        let long_status = "x".repeat(500);
        notify_status(&long_status);

        notify_status("");
        notify_status("Status with\nnewlines\tand\ttabs");
    }

    #[test]
    fn test_notify_stopping_no_panic() {
        notify_stopping();
    }
}
