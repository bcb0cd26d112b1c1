//! # Sweeper
//! src/sweeper/mod.rs
//!
//! Recupera los recursos que el store nunca conoce: directorios de
//! operaciones que vencieron o fallaron antes de registrar un resultado.

pub mod orphans;
pub mod worker;

pub use orphans::{sweep_orphans, sweep_orphans_at};
pub use worker::{OrphanSweeper, SweepReport, SweeperConfig};
