//! Сбор системных метрик хоста.
//!
//! Единственная операция модуля — мгновенный снимок использования ресурсов
//! ([`MetricsSampler::sample`]). Снимки не кэшируются и не сравниваются
//! между собой: каждый HTTP-запрос получает свежее измерение.

pub mod sampler;

pub use sampler::{
    approx_core_temp, approx_gpu_load, build_sample, HostProbe, HostReading, MetricsSample,
    MetricsSampler, MetricsUnavailable, SysinfoProbe, SAMPLE_WINDOW,
};
