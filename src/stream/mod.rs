//! # Streams de Progreso
//! src/stream/mod.rs
//!
//! - `event`: variantes serializables de progreso
//! - `progress`: el stream cancelable que las produce

pub mod event;
pub mod progress;

pub use event::{ErrorClass, ProgressEvent};
pub use progress::{ProgressStream, StreamContext, StreamSettings};
