//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Recolección de métricas de operaciones:
//! - Timeouts y rechazos por capacidad
//! - Éxitos y errores del motor
//! - Streams activos
//! - Duraciones (p50, p95, p99)

pub mod collector;

pub use collector::{MetricsCollector, MetricsSnapshot};
