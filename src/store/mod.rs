//! # Store de Descargas Completadas
//! src/store/mod.rs
//!
//! Mapa de un solo uso `id opaco -> metadatos del archivo`, con expiración
//! por TTL y un tamaño máximo.

pub mod completed;
pub mod record;

pub use completed::{CompletedDownloadStore, StoreConfig};
pub use record::{CompletedDownloadRecord, DownloadId, NewDownload};
