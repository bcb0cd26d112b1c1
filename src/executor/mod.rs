//! # Ejecución Acotada
//! src/executor/mod.rs
//!
//! Pool fijo de threads para llamadas bloqueantes al motor, con un plazo
//! por operación:
//! - `queue`: cola thread-safe de trabajos pendientes
//! - `pool`: workers + `BoundedExecutor::run_with_timeout`

pub mod pool;
pub mod queue;

pub use pool::{BoundedExecutor, PoolStats};
