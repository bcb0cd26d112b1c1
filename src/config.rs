//! # Configuración del Servicio
//! src/config.rs
//!
//! Este módulo define la configuración del servicio de descargas con soporte
//! completo para argumentos CLI y variables de entorno.
//!
//! ## Coordinación de timeouts
//!
//! ```text
//! stream (600s) > download (300s) > info (90s) > socket del motor (30s)
//! ```
//!
//! El socket timeout del motor es lo que acota cuánto sigue vivo un thread
//! huérfano después de que el executor ya devolvió `Timeout`.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./download_gate --max-concurrent-ops 6 \
//!   --worker-threads 8 \
//!   --info-timeout 90 \
//!   info https://example.com/watch?v=abc
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! DLGATE_MAX_CONCURRENT_OPS=4 DLGATE_TEMP_ROOT=/var/tmp ./download_gate stream URL
//! ```

use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Configuración del servicio de descargas
#[derive(Debug, Clone, Parser)]
#[command(name = "download_gate")]
#[command(about = "Admisión, timeouts y limpieza para descargas con un motor externo")]
#[command(version = "0.1.0")]
pub struct Config {
    // === Admisión y workers ===

    /// Máximo de operaciones pesadas simultáneas (más allá: CapacityExceeded)
    #[arg(long = "max-concurrent-ops", default_value = "6", env = "DLGATE_MAX_CONCURRENT_OPS")]
    pub max_concurrent_ops: usize,

    /// Espera máxima por un permiso antes de rechazar, en milisegundos
    #[arg(long = "admission-wait-ms", default_value = "100", env = "DLGATE_ADMISSION_WAIT_MS")]
    pub admission_wait_ms: u64,

    /// Threads del pool; mayor que max-concurrent-ops para absorber huérfanos
    #[arg(long = "worker-threads", default_value = "8", env = "DLGATE_THREAD_POOL_WORKERS")]
    pub worker_threads: usize,

    // === Timeouts ===

    /// Timeout de extracción de información, en segundos
    #[arg(long = "info-timeout", default_value = "90", env = "DLGATE_INFO_TIMEOUT")]
    pub info_timeout_secs: u64,

    /// Timeout de descarga request/response, en segundos
    #[arg(long = "download-timeout", default_value = "300", env = "DLGATE_DOWNLOAD_TIMEOUT")]
    pub download_timeout_secs: u64,

    /// Duración máxima de un stream de progreso, en segundos
    #[arg(long = "stream-timeout", default_value = "600", env = "DLGATE_SSE_TIMEOUT")]
    pub stream_timeout_secs: u64,

    /// Intervalo de polling de la cola de progreso, en milisegundos
    #[arg(long = "poll-interval-ms", default_value = "500", env = "DLGATE_PROGRESS_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Espera al thread de descarga tras una cancelación, en milisegundos
    #[arg(long = "cancel-grace-ms", default_value = "2000", env = "DLGATE_CANCEL_GRACE_MS")]
    pub cancel_grace_ms: u64,

    // === Store de descargas completadas ===

    /// Tiempo de vida de una descarga completada sin reclamar, en segundos
    #[arg(long = "download-expiry", default_value = "300", env = "DLGATE_DOWNLOAD_EXPIRY")]
    pub store_ttl_secs: u64,

    /// Máximo de descargas completadas en memoria
    #[arg(long = "max-downloads", default_value = "100", env = "DLGATE_MAX_DOWNLOADS")]
    pub max_completed_downloads: usize,

    // === Limpieza ===

    /// Edad a partir de la cual un directorio temporal se considera huérfano, en segundos
    #[arg(long = "orphan-age", default_value = "3600", env = "DLGATE_ORPHAN_CLEANUP_AGE")]
    pub orphan_age_secs: u64,

    /// Período del sweeper, en segundos
    #[arg(long = "sweep-period", default_value = "60", env = "DLGATE_SWEEP_PERIOD")]
    pub sweep_period_secs: u64,

    /// Espera máxima al detener el sweeper, en milisegundos
    #[arg(long = "sweeper-join-ms", default_value = "5000", env = "DLGATE_SWEEPER_JOIN_MS")]
    pub sweeper_join_ms: u64,

    /// Directorio raíz para los directorios de trabajo (default: temp del sistema)
    #[arg(long = "temp-root", env = "DLGATE_TEMP_ROOT")]
    pub temp_root: Option<PathBuf>,

    /// Prefijo reservado de los directorios de trabajo
    #[arg(long = "temp-prefix", default_value = "dlgate_", env = "DLGATE_TEMP_PREFIX")]
    pub temp_prefix: String,

    // === Límites ===

    /// Tamaño máximo de archivo en bytes (0 = sin límite)
    #[arg(long = "max-file-size", default_value = "2147483648", env = "DLGATE_MAX_FILE_SIZE")]
    pub max_file_size: u64,

    /// Tamaño de chunk al transmitir archivos, en bytes
    #[arg(long = "chunk-size", default_value = "8192", env = "DLGATE_CHUNK_SIZE")]
    pub chunk_size: usize,

    // === Motor externo ===

    /// Programa del motor de extracción
    #[arg(long = "engine", default_value = "yt-dlp", env = "DLGATE_ENGINE")]
    pub engine_program: String,

    /// Socket timeout interno del motor, en segundos
    #[arg(long = "engine-socket-timeout", default_value = "30", env = "DLGATE_YTDLP_SOCKET_TIMEOUT")]
    pub engine_socket_timeout_secs: u64,

    /// User-Agent que usa el motor
    #[arg(
        long = "user-agent",
        default_value = DEFAULT_USER_AGENT,
        env = "DLGATE_USER_AGENT"
    )]
    pub user_agent: String,

    // === Observabilidad ===

    /// Nivel de log (error, warn, info, debug, trace)
    #[arg(long = "log-level", default_value = "info", env = "DLGATE_LOG_LEVEL")]
    pub log_level: String,

    /// Emitir líneas METRIC en el log
    #[arg(long = "metrics", default_value = "true", env = "DLGATE_METRICS_ENABLED", action = clap::ArgAction::Set)]
    pub metrics_enabled: bool,
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Valida la configuración
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_ops == 0 {
            return Err(ConfigError::Zero("max concurrent ops"));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Zero("worker threads"));
        }
        if self.worker_threads <= self.max_concurrent_ops {
            return Err(ConfigError::PoolTooSmall {
                workers: self.worker_threads,
                capacity: self.max_concurrent_ops,
            });
        }

        let durations = [
            ("info timeout", self.info_timeout_secs),
            ("download timeout", self.download_timeout_secs),
            ("stream timeout", self.stream_timeout_secs),
            ("poll interval", self.poll_interval_ms),
            ("download expiry", self.store_ttl_secs),
            ("sweep period", self.sweep_period_secs),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }

        if self.max_completed_downloads == 0 {
            return Err(ConfigError::Zero("max downloads"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Zero("chunk size"));
        }

        // El barrido por edad no debe alcanzar directorios vivos
        let live_bounds = [
            ("download expiry", self.store_ttl_secs),
            ("stream timeout", self.stream_timeout_secs),
            ("download timeout", self.download_timeout_secs),
            ("info timeout", self.info_timeout_secs),
        ];
        for (other, other_secs) in live_bounds {
            if self.orphan_age_secs <= other_secs {
                return Err(ConfigError::OrphanAgeTooShort {
                    orphan_secs: self.orphan_age_secs,
                    other,
                    other_secs,
                });
            }
        }

        Ok(())
    }

    /// Raíz efectiva de los directorios de trabajo
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn admission_wait(&self) -> Duration {
        Duration::from_millis(self.admission_wait_ms)
    }

    pub fn info_timeout(&self) -> Duration {
        Duration::from_secs(self.info_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn store_ttl(&self) -> Duration {
        Duration::from_secs(self.store_ttl_secs)
    }

    pub fn orphan_age(&self) -> Duration {
        Duration::from_secs(self.orphan_age_secs)
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.sweep_period_secs)
    }

    pub fn sweeper_join(&self) -> Duration {
        Duration::from_millis(self.sweeper_join_ms)
    }

    /// Escribe un resumen de la configuración en el log
    pub fn log_summary(&self) {
        log::info!(
            "admission: max_concurrent_ops={} wait={}ms workers={}",
            self.max_concurrent_ops, self.admission_wait_ms, self.worker_threads
        );
        log::info!(
            "timeouts: info={}s download={}s stream={}s poll={}ms cancel_grace={}ms",
            self.info_timeout_secs,
            self.download_timeout_secs,
            self.stream_timeout_secs,
            self.poll_interval_ms,
            self.cancel_grace_ms
        );
        log::info!(
            "store: ttl={}s max={} | sweeper: period={}s orphan_age={}s root={} prefix={}",
            self.store_ttl_secs,
            self.max_completed_downloads,
            self.sweep_period_secs,
            self.orphan_age_secs,
            self.temp_root().display(),
            self.temp_prefix
        );
        if self.max_file_size > 0 {
            log::info!("limits: max_file_size={} bytes", self.max_file_size);
        } else {
            log::info!("limits: max_file_size=disabled");
        }
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            max_concurrent_ops: 6,
            admission_wait_ms: 100,
            worker_threads: 8,
            info_timeout_secs: 90,
            download_timeout_secs: 300,
            stream_timeout_secs: 600,
            poll_interval_ms: 500,
            cancel_grace_ms: 2_000,
            store_ttl_secs: 300,
            max_completed_downloads: 100,
            orphan_age_secs: 3_600,
            sweep_period_secs: 60,
            sweeper_join_ms: 5_000,
            temp_root: None,
            temp_prefix: "dlgate_".to_string(),
            max_file_size: 2 * 1024 * 1024 * 1024,
            chunk_size: 8192,
            engine_program: "yt-dlp".to_string(),
            engine_socket_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
