//! Конфигурация control-plane.
//!
//! Все параметры читаются из переменных окружения один раз при старте
//! процесса и собираются в явную структуру [`Config`]. Дальше структура
//! передаётся по ссылке (`Arc`) в HTTP-слой; никакой код не читает
//! окружение после инициализации.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};

/// Имя заголовка с ключом по умолчанию.
pub const DEFAULT_API_KEY_HEADER: &str = "access_token";

const DEFAULT_CONTROL_IP: &str = "0.0.0.0";
const DEFAULT_CONTROL_PORT: u16 = 8000;
const DEFAULT_MONITOR_IP: &str = "127.0.0.1";
const DEFAULT_MONITOR_PORT: u16 = 5000;
const DEFAULT_SERVICE_UNIT: &str = "minecraft";
const DEFAULT_SERVICE_DIR: &str = "/opt/minecraft/server";

/// Конфигурация обоих HTTP-сервисов и управляемого юнита.
///
/// # Переменные окружения
///
/// - `API_KEY` — общий секрет управляющего API (обязательна);
/// - `API_KEY_NAME` — имя заголовка с ключом (по умолчанию `access_token`);
/// - `SERVER_IP` / `SERVER_PORT` — адрес управляющего API;
/// - `MONITOR_IP` / `MONITOR_PORT` — адрес публичного монитора;
/// - `SERVICE_UNIT` — имя systemd-юнита управляемого сервиса;
/// - `SERVICE_DIR` — рабочий каталог управляемого сервиса.
#[derive(Debug, Clone)]
pub struct Config {
    /// Общий секрет: клиент предъявляет его в заголовке `api_key_name`.
    pub api_key: String,
    /// Имя HTTP-заголовка, в котором клиент передаёт ключ.
    pub api_key_name: String,
    /// Адрес управляющего API (аутентифицированный сервис).
    pub control_addr: SocketAddr,
    /// Адрес публичного монитора (без аутентификации).
    pub monitor_addr: SocketAddr,
    /// systemd-юнит, которым управляют эндпоинты `/service/*`.
    pub service_unit: String,
    /// Рабочий каталог управляемого сервиса. Зарезервирован для будущих
    /// операций (резервные копии, списки файлов); активные эндпоинты его
    /// не используют.
    pub service_dir: PathBuf,
}

impl Config {
    /// Читает конфигурацию из окружения процесса.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Собирает конфигурацию из произвольного источника переменных.
    ///
    /// Источник подменяется в тестах, как это сделано с путями `/proc`
    /// в сборщиках метрик.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("API_KEY")
            .context("API_KEY must be set: the control API requires a pre-shared key")?;
        let api_key_name =
            lookup("API_KEY_NAME").unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string());

        let control_addr = parse_addr(
            lookup("SERVER_IP"),
            lookup("SERVER_PORT"),
            DEFAULT_CONTROL_IP,
            DEFAULT_CONTROL_PORT,
            "SERVER",
        )?;
        let monitor_addr = parse_addr(
            lookup("MONITOR_IP"),
            lookup("MONITOR_PORT"),
            DEFAULT_MONITOR_IP,
            DEFAULT_MONITOR_PORT,
            "MONITOR",
        )?;

        let service_unit =
            lookup("SERVICE_UNIT").unwrap_or_else(|| DEFAULT_SERVICE_UNIT.to_string());
        let service_dir =
            PathBuf::from(lookup("SERVICE_DIR").unwrap_or_else(|| DEFAULT_SERVICE_DIR.to_string()));

        let cfg = Self {
            api_key,
            api_key_name,
            control_addr,
            monitor_addr,
            service_unit,
            service_dir,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.api_key.trim().is_empty(),
            "API_KEY must not be empty or whitespace-only"
        );
        ensure!(
            !self.api_key_name.is_empty()
                && self
                    .api_key_name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "API_KEY_NAME must be a valid header name (ASCII alphanumerics, '-' or '_', got {:?})",
            self.api_key_name
        );
        ensure!(
            !self.service_unit.is_empty()
                && self
                    .service_unit
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_.@".contains(c)),
            "SERVICE_UNIT must be a plain systemd unit name (got {:?})",
            self.service_unit
        );
        ensure!(
            !self.service_dir.as_os_str().is_empty(),
            "SERVICE_DIR must not be empty"
        );
        Ok(())
    }
}

fn parse_addr(
    ip: Option<String>,
    port: Option<String>,
    default_ip: &str,
    default_port: u16,
    var_prefix: &str,
) -> Result<SocketAddr> {
    let ip: IpAddr = ip
        .unwrap_or_else(|| default_ip.to_string())
        .parse()
        .with_context(|| format!("{var_prefix}_IP must be a valid IP address"))?;
    let port: u16 = match port {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{var_prefix}_PORT must be a port number (got {raw:?})"))?,
        None => default_port,
    };
    Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |name| map.get(name).map(|v| v.to_string())
    }

    #[test]
    fn defaults_applied_when_only_key_is_set() {
        let cfg = Config::from_lookup(lookup_from(&[("API_KEY", "secret")])).expect("config");
        assert_eq!(cfg.api_key, "secret");
        assert_eq!(cfg.api_key_name, DEFAULT_API_KEY_HEADER);
        assert_eq!(cfg.control_addr, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(cfg.monitor_addr, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(cfg.service_unit, "minecraft");
        assert_eq!(cfg.service_dir, PathBuf::from("/opt/minecraft/server"));
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = Config::from_lookup(|_| None).unwrap_err();
        assert!(err.to_string().contains("API_KEY"));
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[("API_KEY", "   ")]));
        assert!(result.is_err());
    }

    #[test]
    fn custom_binds_are_parsed() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("API_KEY", "secret"),
            ("SERVER_IP", "127.0.0.1"),
            ("SERVER_PORT", "9000"),
            ("MONITOR_PORT", "0"),
        ]))
        .expect("config");
        assert_eq!(cfg.control_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.monitor_addr.port(), 0);
    }

    #[test]
    fn malformed_port_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("API_KEY", "secret"),
            ("SERVER_PORT", "not-a-port"),
        ]));
        assert!(result.unwrap_err().to_string().contains("SERVER_PORT"));
    }

    #[test]
    fn malformed_ip_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("API_KEY", "secret"),
            ("MONITOR_IP", "localhost"),
        ]));
        assert!(result.unwrap_err().to_string().contains("MONITOR_IP"));
    }

    #[test]
    fn header_name_with_invalid_characters_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("API_KEY", "secret"),
            ("API_KEY_NAME", "bad header"),
        ]));
        assert!(result.unwrap_err().to_string().contains("API_KEY_NAME"));
    }

    #[test]
    fn unit_name_with_shell_metacharacters_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("API_KEY", "secret"),
            ("SERVICE_UNIT", "minecraft; rm -rf /"),
        ]));
        assert!(result.unwrap_err().to_string().contains("SERVICE_UNIT"));
    }

    #[test]
    fn template_unit_names_are_accepted() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("API_KEY", "secret"),
            ("SERVICE_UNIT", "minecraft@world1.service"),
        ]))
        .expect("config");
        assert_eq!(cfg.service_unit, "minecraft@world1.service");
    }
}
