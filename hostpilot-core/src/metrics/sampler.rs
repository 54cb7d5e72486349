//! Сэмплер системных метрик: CPU, память и выведенные из них значения.
//!
//! Снимок собирается за фиксированное окно усреднения CPU
//! ([`SAMPLE_WINDOW`]), поэтому чтение блокирует вызывающий поток.
//! [`MetricsSampler::sample`] выполняет чтение на блокирующем пуле tokio,
//! чтобы параллельные опросы не выстраивались в очередь за одним запросом.
//!
//! Температура и загрузка GPU — не показания датчиков, а документированная
//! симуляция поверх `cpu_percent` (см. [`approx_core_temp`] и
//! [`approx_gpu_load`]). Формулы зафиксированы: существующие клиенты
//! ожидают именно эти числа. Интеграция настоящего источника датчиков
//! заменяет эти две функции, не трогая формирование ответа.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use sysinfo::System;
use thiserror::Error;

/// Окно усреднения CPU: загрузка считается средней за этот интервал.
pub const SAMPLE_WINDOW: Duration = Duration::from_millis(400);

/// Базовая температура при простое, °C.
const TEMP_BASE_C: f64 = 30.0;
/// Прирост температуры на процент загрузки CPU, °C.
const TEMP_PER_CPU_PERCENT: f64 = 0.15;
/// Доля загрузки CPU, приписываемая GPU.
const GPU_PER_CPU_PERCENT: f64 = 0.5;

const GIB: f64 = (1u64 << 30) as f64;

/// Снимок использования ресурсов хоста на момент опроса.
///
/// Сериализуется ровно в шесть полей с этими именами — это внешний
/// контракт обоих HTTP-сервисов. Снимок неизменяем, нигде не хранится
/// и не сравнивается с предыдущими.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    /// Средняя загрузка CPU за окно усреднения, [0, 100].
    pub cpu_percent: f64,
    /// Используемая физическая память в ГиБ, один знак после запятой.
    pub mem_used_gb: f64,
    /// Всего физической памяти в ГиБ, один знак после запятой.
    pub mem_total_gb: f64,
    /// Использование физической памяти в процентах, [0, 100].
    pub mem_percent: f64,
    /// Приближённая температура ядра, °C (симуляция, см. модульную документацию).
    pub temp_c: i64,
    /// Приближённая загрузка GPU в процентах, [0, 100) (симуляция).
    pub gpu_percent: i64,
}

/// Сырое чтение счётчиков хоста до применения числовой политики.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostReading {
    /// Средняя загрузка CPU за окно, как её сообщил хост.
    pub cpu_percent: f64,
    /// Используемая физическая память, байты.
    pub mem_used_bytes: u64,
    /// Всего физической памяти, байты.
    pub mem_total_bytes: u64,
}

/// Счётчики хоста недоступны (ограниченная песочница, нет прав и т.п.).
///
/// Сэмплер не повторяет попытку: ошибка доходит до HTTP-границы и
/// превращается там в ответ 500. Детали исходной ошибки остаются в логах
/// сервера и не попадают клиенту.
#[derive(Debug, Error)]
#[error("host statistics facility is unavailable")]
pub struct MetricsUnavailable(#[source] pub anyhow::Error);

/// Источник сырых чтений счётчиков хоста.
///
/// Продакшен использует [`SysinfoProbe`]; тесты подставляют детерминированные
/// чтения или инжектируют отказ.
pub trait HostProbe: Send + Sync {
    /// Читает счётчики хоста, блокируясь на `window` для усреднения CPU.
    fn read(&self, window: Duration) -> Result<HostReading, MetricsUnavailable>;
}

/// Чтение счётчиков через `sysinfo`.
///
/// Каждый вызов создаёт свежий `System`: состояние между запросами не
/// разделяется, и параллельные опросы читают счётчики независимо.
pub struct SysinfoProbe;

impl HostProbe for SysinfoProbe {
    fn read(&self, window: Duration) -> Result<HostReading, MetricsUnavailable> {
        let mut system = System::new();

        // Загрузка CPU — это дельта между двумя чтениями; первое чтение
        // только фиксирует начальную точку окна.
        system.refresh_cpu_usage();
        std::thread::sleep(window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        system.refresh_cpu_usage();
        system.refresh_memory();

        let mem_total_bytes = system.total_memory();
        if mem_total_bytes == 0 {
            return Err(MetricsUnavailable(anyhow!(
                "host reported zero total memory, statistics are unreadable"
            )));
        }

        Ok(HostReading {
            cpu_percent: f64::from(system.global_cpu_info().cpu_usage()),
            mem_used_bytes: system.used_memory(),
            mem_total_bytes,
        })
    }
}

/// Приближённая температура ядра по загрузке CPU.
///
/// Симуляция вместо платформо-зависимых датчиков: 30 °C в простое плюс
/// 0.15 °C на каждый процент загрузки, с округлением до целого.
pub fn approx_core_temp(cpu_percent: f64) -> i64 {
    (TEMP_BASE_C + cpu_percent * TEMP_PER_CPU_PERCENT).round() as i64
}

/// Приближённая загрузка GPU по загрузке CPU.
///
/// Симуляция вместо вендорных интерфейсов (NVML и т.п.): половина
/// загрузки CPU по модулю 100, с округлением до целого.
pub fn approx_gpu_load(cpu_percent: f64) -> i64 {
    ((cpu_percent * GPU_PER_CPU_PERCENT) % 100.0).round() as i64
}

/// Применяет числовую политику к сырому чтению.
///
/// - `cpu_percent` ограничивается диапазоном [0, 100];
/// - память переводится из байтов в ГиБ (деление на 2^30) с округлением
///   до одного знака;
/// - `mem_percent` считается из тех же байтовых счётчиков;
/// - `temp_c` и `gpu_percent` выводятся из `cpu_percent`.
pub fn build_sample(reading: &HostReading) -> MetricsSample {
    let cpu_percent = reading.cpu_percent.clamp(0.0, 100.0);
    let mem_percent = if reading.mem_total_bytes == 0 {
        0.0
    } else {
        round_to_one_decimal(
            reading.mem_used_bytes as f64 / reading.mem_total_bytes as f64 * 100.0,
        )
    };

    MetricsSample {
        cpu_percent,
        mem_used_gb: round_to_one_decimal(reading.mem_used_bytes as f64 / GIB),
        mem_total_gb: round_to_one_decimal(reading.mem_total_bytes as f64 / GIB),
        mem_percent,
        temp_c: approx_core_temp(cpu_percent),
        gpu_percent: approx_gpu_load(cpu_percent),
    }
}

fn round_to_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Сэмплер метрик хоста.
///
/// Лёгкий и клонируемый: оба HTTP-сервиса разделяют один экземпляр, но
/// каждый вызов [`sample`](Self::sample) выполняет независимое чтение —
/// без кэша и без синхронизации между запросами.
#[derive(Clone)]
pub struct MetricsSampler {
    probe: Arc<dyn HostProbe>,
    window: Duration,
}

impl MetricsSampler {
    /// Сэмплер с продакшен-источником (`sysinfo`).
    pub fn new() -> Self {
        Self::with_probe(Arc::new(SysinfoProbe))
    }

    /// Сэмплер с подменённым источником чтений.
    pub fn with_probe(probe: Arc<dyn HostProbe>) -> Self {
        Self {
            probe,
            window: SAMPLE_WINDOW,
        }
    }

    /// Собирает один снимок метрик.
    ///
    /// Чтение блокируется на окно усреднения, поэтому выполняется через
    /// `spawn_blocking`: обработчик запроса приостанавливается, но рабочие
    /// потоки рантайма остаются свободными для других запросов.
    pub async fn sample(&self) -> Result<MetricsSample, MetricsUnavailable> {
        let probe = Arc::clone(&self.probe);
        let window = self.window;
        tokio::task::spawn_blocking(move || probe.read(window).map(|r| build_sample(&r)))
            .await
            .map_err(|e| MetricsUnavailable(anyhow!("sampling task did not complete: {e}")))?
    }
}

impl Default for MetricsSampler {
    fn default() -> Self {
        Self::new()
    }
}
