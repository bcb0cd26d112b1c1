//! # Transporte
//! src/transport/mod.rs
//!
//! Adaptadores entre los streams del servicio y el cliente.

pub mod sse;

pub use sse::{frame, SseStream};
