//! # Taxonomía de Errores
//! src/error.rs
//!
//! Errores que cruzan la frontera del crate:
//! - `GateError`: admisión, timeouts, validación del store, directorios de trabajo
//! - `EngineError`: fallos del motor externo, ya clasificados transitorio/permanente
//! - `ConfigError`: configuración inválida al arrancar

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Clase de fallo reportada por el motor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Puede funcionar si se reintenta (red, rate limit, 5xx)
    Transient,

    /// No se debe reintentar (URL inválida, formato inexistente, archivo muy grande)
    Permanent,

    /// El consumidor abandonó la operación
    Cancelled,
}

/// Error del motor externo
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    kind: FailureKind,
    message: String,
}

impl EngineError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Transient, message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Permanent, message: message.into() }
    }

    pub fn cancelled() -> Self {
        Self { kind: FailureKind::Cancelled, message: "Download cancelled by client".to_string() }
    }

    /// Clasifica un mensaje crudo del motor por palabras clave
    ///
    /// Las URLs no soportadas son permanentes aunque mencionen "connection".
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("unsupported url") || lower.contains("is not a valid url") {
            return Self::permanent(message);
        }

        let transient = ["network", "connection", "timeout", "timed out"]
            .iter()
            .any(|needle| lower.contains(needle));

        if transient {
            Self::transient(message)
        } else {
            Self::permanent(message)
        }
    }

    /// Archivo final por encima del límite configurado
    pub fn file_too_large(size: u64, limit: u64) -> Self {
        let size_mb = size as f64 / (1024.0 * 1024.0);
        let limit_mb = limit as f64 / (1024.0 * 1024.0);
        Self::permanent(format!(
            "File size ({:.1} MB) exceeds maximum allowed ({:.1} MB)",
            size_mb, limit_mb
        ))
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == FailureKind::Transient
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == FailureKind::Cancelled
    }
}

impl From<io::Error> for EngineError {
    /// Fallos de I/O hablando con el motor se consideran transitorios
    fn from(err: io::Error) -> Self {
        Self::transient(format!("Network error: {}", err))
    }
}

/// Errores del núcleo de admisión/ejecución
#[derive(Debug, Error)]
pub enum GateError {
    /// Todos los permisos están en uso
    #[error("Server busy: {capacity} operations already in progress, retry later")]
    CapacityExceeded { capacity: usize },

    /// Se agotó el plazo; el trabajo puede seguir ejecutándose
    #[error("Operation timed out after {:.1}s (it may still be running)", .0.as_secs_f64())]
    Timeout(Duration),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Registro incompleto: error del programador, no de ejecución
    #[error("Invalid download record: missing {0}")]
    StoreValidation(&'static str),

    /// El registro recién guardado era el más viejo y salió al recortar
    #[error("Download was evicted on store: {max_entries} newer downloads are already held")]
    EvictedOnStore { max_entries: usize },

    /// No se pudo crear el directorio de trabajo (disco/permisos)
    #[error("Failed to create work directory in {}: {source}", .path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// El registro apunta fuera del directorio temporal esperado
    #[error("Download record failed path validation: {}", .0.display())]
    UntrustedPath(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Worker pool is shut down")]
    PoolClosed,

    #[error("Worker panicked while running the operation")]
    WorkerPanicked,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Cómo debe responder la frontera (HTTP, CLI) a un error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Reintentar más tarde (503 + Retry-After)
    RetryLater,

    /// Reintentar más tarde, avisando que la operación puede seguir corriendo
    RetryLaterMayBeRunning,

    /// Propagar el error del motor tal cual
    PassThrough,

    /// Fallo interno, no reintentar
    Fatal,
}

impl GateError {
    pub fn disposition(&self) -> Disposition {
        match self {
            GateError::CapacityExceeded { .. } => Disposition::RetryLater,
            GateError::Timeout(_) => Disposition::RetryLaterMayBeRunning,
            GateError::Engine(_) => Disposition::PassThrough,
            _ => Disposition::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            GateError::CapacityExceeded { .. } | GateError::Timeout(_) => true,
            GateError::Engine(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Errores de validación de configuración
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be >= 1")]
    Zero(&'static str),

    #[error("worker threads ({workers}) must be greater than max concurrent ops ({capacity})")]
    PoolTooSmall { workers: usize, capacity: usize },

    #[error("orphan age ({orphan_secs}s) must be greater than {other} ({other_secs}s)")]
    OrphanAgeTooShort {
        orphan_secs: u64,
        other: &'static str,
        other_secs: u64,
    },
}
