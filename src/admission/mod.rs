//! # Control de Admisión
//! src/admission/mod.rs
//!
//! Limita cuántas operaciones pesadas (llamadas al motor externo) pueden
//! estar en curso al mismo tiempo. Como esas llamadas no se pueden
//! interrumpir, el límite se aplica al entrar y no al ejecutar.

pub mod gate;

pub use gate::{AdmissionGate, GateStats, Permit};
