//! # Servicio de Descargas
//! src/service/mod.rs
//!
//! Objeto de servicio creado explícitamente al arrancar. Es dueño de una
//! compuerta, un executor, un store y un sweeper por proceso.
//!
//! ```text
//! fetch_info ──┐
//! download ────┼─► BoundedExecutor (permiso + pool + plazo) ─► Engine
//!              │
//! stream ──────┴─► AdmissionGate ─► ProgressStream ─► Engine
//!                                        │ éxito
//!                                        ▼
//! open_download ◄──────────────── CompletedDownloadStore ◄── OrphanSweeper
//! ```

pub mod file;
pub mod health;

pub use file::{FileDownload, FileStream};
pub use health::{HealthReport, HealthStatus};

use crate::admission::AdmissionGate;
use crate::config::Config;
use crate::engine::{DownloadHooks, DownloadRequest, Engine, MediaInfo};
use crate::error::{EngineError, GateError};
use crate::executor::BoundedExecutor;
use crate::metrics::MetricsCollector;
use crate::store::{CompletedDownloadRecord, CompletedDownloadStore, StoreConfig};
use crate::stream::{ProgressStream, StreamContext, StreamSettings};
use crate::sweeper::{OrphanSweeper, SweeperConfig};
use crate::workdir;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Servicio de descargas
pub struct DownloadService {
    config: Config,
    engine: Arc<dyn Engine>,

    // === Componentes compartidos ===
    executor: BoundedExecutor,
    store: CompletedDownloadStore,
    sweeper: Mutex<Option<OrphanSweeper>>,
    metrics: MetricsCollector,

    /// Raíz canónica de los directorios de trabajo
    temp_root: PathBuf,
}

impl DownloadService {
    /// Valida la configuración y construye todos los componentes
    pub fn start(config: Config, engine: Arc<dyn Engine>) -> Result<Self, GateError> {
        config.validate()?;

        let root = config.temp_root();
        let temp_root = fs::create_dir_all(&root)
            .and_then(|_| fs::canonicalize(&root))
            .map_err(|source| GateError::WorkDir { path: root.clone(), source })?;

        let gate = AdmissionGate::new(config.max_concurrent_ops, config.admission_wait());
        let executor = BoundedExecutor::new(gate, config.worker_threads)?;
        let store = CompletedDownloadStore::new(StoreConfig::from_config(&config));

        let sweeper_config = SweeperConfig {
            temp_root: temp_root.clone(),
            ..SweeperConfig::from_config(&config)
        };
        let sweeper = OrphanSweeper::start(store.clone(), sweeper_config)?;

        log::info!(
            "download service started (capacity {}, {} workers, temp root {})",
            config.max_concurrent_ops,
            config.worker_threads,
            temp_root.display()
        );

        Ok(Self {
            metrics: MetricsCollector::from_config(&config),
            config,
            engine,
            executor,
            store,
            sweeper: Mutex::new(Some(sweeper)),
            temp_root,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &CompletedDownloadStore {
        &self.store
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn gate(&self) -> &AdmissionGate {
        self.executor.gate()
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    fn lock_sweeper(&self) -> MutexGuard<'_, Option<OrphanSweeper>> {
        match self.sweeper.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Registra el resultado de una operación del executor
    fn observe<T>(&self, operation: &str, started: Instant, result: &Result<T, GateError>) {
        let elapsed = started.elapsed();
        match result {
            Ok(_) => self.metrics.record_success(operation, elapsed),
            Err(GateError::CapacityExceeded { .. }) => self.metrics.record_rejection(operation),
            Err(GateError::Timeout(_)) => self.metrics.record_timeout(operation, elapsed),
            Err(e) => self.metrics.record_error(operation, &e.to_string(), elapsed),
        }
    }

    /// Metadatos y formatos de `url`, con el timeout de info
    pub fn fetch_info(&self, url: &str) -> Result<MediaInfo, GateError> {
        let engine = Arc::clone(&self.engine);
        let url = url.to_string();
        let started = Instant::now();

        let result = self.executor.run_with_timeout(
            move || engine.extract_info(&url).map_err(GateError::from),
            self.config.info_timeout(),
        );

        self.observe("info", started, &result);
        result
    }

    /// Descarga completa por el camino request/response
    ///
    /// Si vence el plazo el trabajo sigue en el pool; cuando termina, su
    /// resultado se descarta y el `FileDownload` descartado borra su directorio.
    pub fn download(&self, request: DownloadRequest) -> Result<FileDownload, GateError> {
        let engine = Arc::clone(&self.engine);
        let root = self.temp_root.clone();
        let prefix = self.config.temp_prefix.clone();
        let max_file_size = self.config.max_file_size;
        let chunk_size = self.config.chunk_size;
        let started = Instant::now();

        let result = self.executor.run_with_timeout(
            move || {
                let work_dir = workdir::create_work_dir(&root, &prefix)?;
                Self::download_into(&*engine, &request, work_dir, max_file_size, chunk_size)
            },
            self.config.download_timeout(),
        );

        self.observe("download", started, &result);
        result
    }

    /// Corre el motor dentro de `work_dir`; en error borra el directorio
    fn download_into(
        engine: &dyn Engine,
        request: &DownloadRequest,
        work_dir: PathBuf,
        max_file_size: u64,
        chunk_size: usize,
    ) -> Result<FileDownload, GateError> {
        let located = engine
            .download(request, &work_dir, &DownloadHooks::detached())
            .and_then(|output| {
                let file_path = workdir::locate_output_file(&work_dir, output.file_path.as_deref())
                    .ok_or_else(|| EngineError::permanent("Download completed but file not found"))?;

                let file_size = fs::metadata(&file_path)
                    .map_err(|e| EngineError::permanent(format!("Could not read downloaded file: {}", e)))?
                    .len();

                if max_file_size > 0 && file_size > max_file_size {
                    return Err(EngineError::file_too_large(file_size, max_file_size));
                }

                Ok(file_path)
            });

        let file_path = match located {
            Ok(path) => path,
            Err(e) => {
                workdir::remove_work_dir(&work_dir);
                return Err(GateError::Engine(e));
            }
        };

        let filename = workdir::ascii_filename(&file_path, request.fallback_extension());
        let content_type = workdir::content_type_for(&file_path).to_string();

        FileDownload::open(&file_path, work_dir, filename, content_type, chunk_size)
    }

    fn stream_context(&self) -> StreamContext {
        StreamContext {
            store: self.store.clone(),
            settings: StreamSettings::from_config(&self.config),
            metrics: self.metrics.clone(),
        }
    }

    /// Inicia una descarga con progreso
    ///
    /// El permiso pasa al stream y se libera cuando el stream termina o se cierra.
    pub fn stream_download(&self, request: DownloadRequest) -> Result<ProgressStream, GateError> {
        let permit = match self.gate().acquire_default() {
            Ok(permit) => permit,
            Err(e) => {
                self.metrics.record_rejection("stream");
                return Err(e);
            }
        };

        let work_dir = workdir::create_work_dir(&self.temp_root, &self.config.temp_prefix)?;

        ProgressStream::spawn(
            Arc::clone(&self.engine),
            request,
            permit,
            work_dir,
            self.stream_context(),
        )
    }

    /// Reclama un registro completado sin abrir el archivo
    pub fn take_download(&self, id: &str) -> Option<CompletedDownloadRecord> {
        self.store.take(id)
    }

    /// Reclama un registro completado y abre su archivo
    ///
    /// `Ok(None)` si el ID no existe, ya se usó o expiró.
    pub fn open_download(&self, id: &str) -> Result<Option<FileDownload>, GateError> {
        let Some(record) = self.store.take(id) else {
            return Ok(None);
        };

        let (work_dir, file_path) = match self.validate_record(&record) {
            Ok(paths) => paths,
            Err(e) => {
                log::error!("refusing download {:?}: {}", record.id, e);
                return Err(e);
            }
        };

        FileDownload::open(
            &file_path,
            work_dir,
            record.filename,
            record.content_type,
            self.config.chunk_size,
        )
        .map(Some)
    }

    /// `temp_dir` debe ser un hijo con prefijo de la raíz y `file_path` estar dentro
    fn validate_record(&self, record: &CompletedDownloadRecord) -> Result<(PathBuf, PathBuf), GateError> {
        let untrusted = || GateError::UntrustedPath(record.file_path.clone());

        let work_dir = fs::canonicalize(&record.temp_dir).map_err(|_| untrusted())?;
        if !workdir::is_managed_dir(&self.temp_root, &self.config.temp_prefix, &work_dir) {
            return Err(untrusted());
        }

        let file_path = fs::canonicalize(&record.file_path).map_err(|_| untrusted())?;
        if !file_path.starts_with(&work_dir) || !file_path.is_file() {
            return Err(untrusted());
        }

        Ok((work_dir, file_path))
    }

    pub fn health(&self) -> HealthReport {
        let admission = self.gate().stats();
        let pool = self.executor.stats();
        let sweeper_running = self
            .lock_sweeper()
            .as_ref()
            .map(OrphanSweeper::is_running)
            .unwrap_or(false);

        HealthReport {
            status: HealthReport::status_for(&admission, self.executor.is_closed(), sweeper_running),
            admission,
            pool,
            stored_downloads: self.store.len(),
            sweeper_running,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Detiene el sweeper (espera acotada) y cierra el pool; idempotente
    pub fn shutdown(&self) {
        let sweeper = self.lock_sweeper().take();
        if let Some(mut sweeper) = sweeper {
            log::info!("shutting down download service");
            sweeper.stop();
        }
        self.executor.shutdown();
    }
}

impl Drop for DownloadService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
