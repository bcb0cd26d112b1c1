//! # Download Gate
//! src/lib.rs
//!
//! Admisión, timeouts, cancelación y ciclo de vida de recursos efímeros
//! alrededor de un motor externo bloqueante que no se puede interrumpir.
//!
//! ## Arquitectura
//!
//! - `admission`: compuerta de permisos fail-fast
//! - `executor`: pool fijo de workers con plazo por operación
//! - `stream`: stream de progreso cancelable
//! - `store`: store de un solo uso para descargas completadas
//! - `sweeper`: limpieza periódica de expirados y huérfanos
//! - `engine`: contrato con el motor y adaptador de línea de comandos
//! - `service`: el objeto de servicio que une todo
//! - `transport`: framing SSE
//! - `workdir`, `metrics`, `config`, `error`, `logging`
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use download_gate::config::Config;
//! use download_gate::engine::{CommandEngine, DownloadRequest};
//! use download_gate::service::DownloadService;
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let engine = Arc::new(CommandEngine::from_config(&config));
//! let service = DownloadService::start(config, engine).expect("service");
//!
//! for event in service.stream_download(DownloadRequest::new("https://example.com/v")).expect("admitted") {
//!     println!("{}", event.to_json());
//! }
//! ```

pub mod admission;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod service;
pub mod store;
pub mod stream;
pub mod sweeper;
pub mod transport;
pub mod workdir;

pub use error::{EngineError, GateError};
pub use service::DownloadService;
