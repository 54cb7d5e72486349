//! Управление процессом сервиса через системный менеджер (systemctl).
//!
//! Команды жизненного цикла отправляются без ожидания результата:
//! обработчик отвечает сразу после запуска команды, а её код завершения
//! дожидается фоновая задача и фиксирует его в логах. Каждая отправка
//! внутренне возвращает `Result`; HTTP-слой игнорирует его осознанно
//! (контракт fire-and-forget).
//!
//! Запрос статуса — единственная операция, ожидающая ответа менеджера:
//! она читает строку active-state юнита и разбирает её в [`ActiveState`].

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

/// Команда жизненного цикла управляемого юнита.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Restart,
    Stop,
}

impl ServiceAction {
    /// Глагол команды, как его принимает systemctl.
    pub fn verb(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Restart => "restart",
            ServiceAction::Stop => "stop",
        }
    }

    /// Причастие для текста немедленного подтверждения.
    pub fn progress(&self) -> &'static str {
        match self {
            ServiceAction::Start => "starting",
            ServiceAction::Restart => "restarting",
            ServiceAction::Stop => "stopping",
        }
    }
}

/// Строка active-state, которую менеджер сервисов сообщает о юните.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveState {
    Active,
    Inactive,
    Failed,
    /// Прочие состояния (activating, deactivating и т.п.).
    Other(String),
}

impl ActiveState {
    /// Разбирает вывод `systemctl is-active`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "active" => ActiveState::Active,
            "inactive" => ActiveState::Inactive,
            "failed" => ActiveState::Failed,
            other => ActiveState::Other(other.to_string()),
        }
    }

    /// Считается ли юнит работающим.
    pub fn is_running(&self) -> bool {
        matches!(self, ActiveState::Active)
    }
}

/// Менеджер одного systemd-юнита.
///
/// Путь к systemctl подменяется в тестах, чтобы не трогать настоящий
/// менеджер сервисов.
#[derive(Debug, Clone)]
pub struct ServiceManager {
    unit: String,
    systemctl: PathBuf,
}

impl ServiceManager {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            systemctl: PathBuf::from("systemctl"),
        }
    }

    /// Подменяет бинарь systemctl (для тестов).
    pub fn with_systemctl(mut self, path: impl Into<PathBuf>) -> Self {
        self.systemctl = path.into();
        self
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Отправляет команду жизненного цикла и возвращается, не дожидаясь
    /// её завершения.
    ///
    /// `Err` означает, что команду не удалось даже запустить (нет бинаря,
    /// нет прав на exec). Код завершения уже запущенной команды логируется
    /// фоновой задачей; HTTP-слой его не видит.
    ///
    /// Повторная отправка той же команды безопасна: systemctl трактует
    /// `start` работающего юнита как no-op.
    pub fn dispatch(&self, action: ServiceAction) -> Result<()> {
        let child = Command::new(&self.systemctl)
            .arg(action.verb())
            .arg(&self.unit)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| {
                format!(
                    "failed to spawn {} {} {}",
                    self.systemctl.display(),
                    action.verb(),
                    self.unit
                )
            })?;

        let unit = self.unit.clone();
        let verb = action.verb();
        tokio::spawn(async move {
            match child.wait_with_output().await {
                Ok(output) if output.status.success() => {
                    info!(unit = %unit, action = verb, "service command completed");
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(
                        unit = %unit,
                        action = verb,
                        status = %output.status,
                        stderr = %stderr.trim(),
                        "service command reported failure"
                    );
                }
                Err(e) => {
                    warn!(unit = %unit, action = verb, error = %e, "failed to collect service command outcome");
                }
            }
        });

        Ok(())
    }

    /// Запрашивает active-state юнита у менеджера сервисов.
    ///
    /// `systemctl is-active` печатает состояние в stdout и завершается
    /// ненулевым кодом для неактивных юнитов, поэтому код завершения
    /// здесь не проверяется — разбирается только строка.
    pub async fn status(&self) -> Result<ActiveState> {
        let output = Command::new(&self.systemctl)
            .arg("is-active")
            .arg(&self.unit)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| {
                format!(
                    "failed to run {} is-active {}",
                    self.systemctl.display(),
                    self.unit
                )
            })?;

        Ok(ActiveState::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Отправляет запрос на перезагрузку хоста, не дожидаясь результата.
    pub fn reboot_host(&self) -> Result<()> {
        let child = Command::new(&self.systemctl)
            .arg("reboot")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {} reboot", self.systemctl.display()))?;

        tokio::spawn(async move {
            match child.wait_with_output().await {
                Ok(output) if output.status.success() => {
                    info!("reboot command accepted");
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(status = %output.status, stderr = %stderr.trim(), "reboot command reported failure");
                }
                Err(e) => {
                    warn!(error = %e, "failed to collect reboot command outcome");
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_state_parsing() {
        assert_eq!(ActiveState::parse("active\n"), ActiveState::Active);
        assert_eq!(ActiveState::parse("inactive"), ActiveState::Inactive);
        assert_eq!(ActiveState::parse("failed"), ActiveState::Failed);
        assert_eq!(
            ActiveState::parse("activating"),
            ActiveState::Other("activating".to_string())
        );
    }

    #[test]
    fn only_active_counts_as_running() {
        assert!(ActiveState::Active.is_running());
        assert!(!ActiveState::Inactive.is_running());
        assert!(!ActiveState::Failed.is_running());
        assert!(!ActiveState::Other("activating".to_string()).is_running());
    }

    #[test]
    fn action_verbs_match_systemctl() {
        assert_eq!(ServiceAction::Start.verb(), "start");
        assert_eq!(ServiceAction::Restart.verb(), "restart");
        assert_eq!(ServiceAction::Stop.verb(), "stop");
    }

    #[tokio::test]
    async fn dispatch_succeeds_with_harmless_binary() {
        // `true` принимает любые аргументы и сразу завершается успехом.
        let manager = ServiceManager::new("dummy").with_systemctl("/bin/true");
        assert!(manager.dispatch(ServiceAction::Start).is_ok());
        // Повторная отправка не ошибается (идемпотентность на уровне HTTP).
        assert!(manager.dispatch(ServiceAction::Start).is_ok());
    }

    #[tokio::test]
    async fn dispatch_fails_when_binary_is_missing() {
        let manager = ServiceManager::new("dummy").with_systemctl("/nonexistent/systemctl");
        assert!(manager.dispatch(ServiceAction::Stop).is_err());
    }

    #[tokio::test]
    async fn status_fails_when_binary_is_missing() {
        let manager = ServiceManager::new("dummy").with_systemctl("/nonexistent/systemctl");
        assert!(manager.status().await.is_err());
    }

    #[tokio::test]
    async fn status_parses_whatever_the_manager_prints() {
        // `echo` вместо systemctl: печатает "is-active dummy", что не
        // является известным состоянием и значит «не работает».
        let manager = ServiceManager::new("dummy").with_systemctl("/bin/echo");
        let state = manager.status().await.expect("status");
        assert!(!state.is_running());
    }
}
