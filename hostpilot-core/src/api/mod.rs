//! HTTP-слой control-plane.
//!
//! Два сервиса поверх общего состояния: аутентифицированный управляющий
//! API (метрики, команды сервису, перезагрузка хоста) и публичный монитор
//! (только метрики).

mod auth;
mod server;

pub use server::{ApiServer, ApiServerHandle, ApiState};
