//! # Stream de Progreso
//! src/stream/progress.rs
//!
//! Secuencia perezosa y finita de `ProgressEvent` para una descarga.
//!
//! ## Ciclo de vida
//!
//! ```text
//! spawn ──► thread dedicado corre el motor con hooks ──► canal FIFO
//!              │                                          │
//!              │ Finished(resultado) al terminar           ▼
//!              └────────────────────────────────────► next(): evento | waiting
//!                                                         │
//!                       complete | error | timeout ◄──────┘ (terminal, una vez)
//! ```
//!
//! `close()` (o `drop`) levanta la bandera de cancelación, espera un tiempo
//! acotado al thread, borra el directorio de trabajo si no pasó al store y
//! libera el permiso. Todo eso ocurre exactamente una vez.

use crate::admission::Permit;
use crate::config::Config;
use crate::engine::{DownloadHooks, DownloadOutput, DownloadRequest, Engine};
use crate::error::{EngineError, GateError};
use crate::metrics::MetricsCollector;
use crate::store::{CompletedDownloadStore, NewDownload};
use crate::stream::event::ProgressEvent;
use crate::workdir;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Intervalo con el que se revisa si el thread ya terminó tras cancelar
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Parámetros de un stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Espera máxima por evento antes de emitir `waiting`
    pub poll_interval: Duration,

    /// Duración máxima total del stream
    pub timeout: Duration,

    /// Espera al thread tras cancelar
    pub cancel_grace: Duration,

    /// Tamaño máximo del archivo final (0 = sin límite)
    pub max_file_size: u64,
}

impl StreamSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            timeout: config.stream_timeout(),
            cancel_grace: config.cancel_grace(),
            max_file_size: config.max_file_size,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(600),
            cancel_grace: Duration::from_secs(2),
            max_file_size: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Colaboradores compartidos que necesita cada stream
#[derive(Clone)]
pub struct StreamContext {
    pub store: CompletedDownloadStore,
    pub settings: StreamSettings,
    pub metrics: MetricsCollector,
}

/// Mensajes del thread de descarga al consumidor
enum WorkerMessage {
    Event(ProgressEvent),
    Finished(Result<DownloadOutput, EngineError>),
}

/// Stream de progreso de una descarga
pub struct ProgressStream {
    // === Canal con el thread ===
    events: Receiver<WorkerMessage>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,

    // === Recursos de la operación ===
    permit: Option<Permit>,
    work_dir: PathBuf,
    owns_work_dir: bool,

    request: DownloadRequest,
    context: StreamContext,
    started: Instant,

    /// Ya se emitió el evento terminal (o se cerró antes)
    done: bool,
    closed: bool,
}

impl ProgressStream {
    /// Inicia la descarga en un thread dedicado
    ///
    /// El stream toma posesión del permiso y del directorio de trabajo.
    pub fn spawn(
        engine: Arc<dyn Engine>,
        request: DownloadRequest,
        permit: Permit,
        work_dir: PathBuf,
        context: StreamContext,
    ) -> Result<Self, GateError> {
        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));

        let hooks = {
            let tx = tx.clone();
            DownloadHooks::new(Arc::clone(&cancel), move |event| {
                let _ = tx.send(WorkerMessage::Event(event));
            })
        };

        let worker_request = request.clone();
        let worker_dir = work_dir.clone();

        let spawned = thread::Builder::new()
            .name("dlgate-stream".to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    engine.download(&worker_request, &worker_dir, &hooks)
                }))
                .unwrap_or_else(|_| Err(EngineError::permanent("Download worker panicked")));

                drop(hooks);
                let _ = tx.send(WorkerMessage::Finished(result));
            });

        let worker = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                workdir::remove_work_dir(&work_dir);
                return Err(GateError::Io(e));
            }
        };

        log::info!("started progress stream for {}", request.url);
        context.metrics.stream_opened();

        Ok(Self {
            events: rx,
            cancel,
            worker: Some(worker),
            permit: Some(permit),
            work_dir,
            owns_work_dir: true,
            request,
            context,
            started: Instant::now(),
            done: false,
            closed: false,
        })
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Ya emitió su evento terminal o fue cerrado
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Cancela y libera todo; idempotente
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.done = true;

        self.cancel.store(true, Ordering::SeqCst);
        self.wait_for_worker();

        if self.owns_work_dir {
            workdir::remove_work_dir(&self.work_dir);
            self.owns_work_dir = false;
        }

        if let Some(mut permit) = self.permit.take() {
            permit.release();
        }

        self.context.metrics.stream_closed();
        log::debug!("progress stream for {} closed after {:?}", self.request.url, self.elapsed());
    }

    /// Espera acotada al thread; si no termina, se abandona
    fn wait_for_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let grace = self.context.settings.cancel_grace;
        let deadline = Instant::now() + grace;
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL);
        }

        if worker.is_finished() {
            if worker.join().is_err() {
                log::error!("download worker for {} panicked", self.request.url);
            }
        } else {
            log::warn!(
                "download worker for {} did not stop within {:?}; leaving it running",
                self.request.url,
                grace
            );
        }
    }

    /// Evento terminal por timeout del stream
    fn time_out(&mut self) -> ProgressEvent {
        let limit = self.context.settings.timeout;
        log::warn!("progress stream for {} exceeded {:?}; cancelling", self.request.url, limit);
        self.context.metrics.record_timeout("stream", self.elapsed());

        self.close();
        ProgressEvent::timed_out(limit)
    }

    /// Evento terminal a partir del resultado del motor
    fn finish(&mut self, result: Result<DownloadOutput, EngineError>) -> ProgressEvent {
        let elapsed = self.elapsed();

        let event = match result.and_then(|output| self.publish(output)) {
            Ok(event) => {
                self.context.metrics.record_success("stream", elapsed);
                event
            }
            Err(e) => {
                log::warn!("download failed for {}: {}", self.request.url, e);
                self.context.metrics.record_error("stream", e.message(), elapsed);
                ProgressEvent::from_engine_error(&e)
            }
        };

        self.close();
        event
    }

    /// Localiza el archivo final y lo registra en el store
    fn publish(&mut self, output: DownloadOutput) -> Result<ProgressEvent, EngineError> {
        let file_path = workdir::locate_output_file(&self.work_dir, output.file_path.as_deref())
            .ok_or_else(|| EngineError::permanent("Download completed but file not found"))?;

        let file_size = fs::metadata(&file_path)
            .map_err(|e| EngineError::permanent(format!("Could not read downloaded file: {}", e)))?
            .len();

        let limit = self.context.settings.max_file_size;
        if limit > 0 && file_size > limit {
            return Err(EngineError::file_too_large(file_size, limit));
        }

        let filename = workdir::ascii_filename(&file_path, self.request.fallback_extension());
        let content_type = workdir::content_type_for(&file_path).to_string();

        let id = self
            .context
            .store
            .store(NewDownload {
                file_path,
                temp_dir: self.work_dir.clone(),
                filename: filename.clone(),
                file_size,
                content_type,
            })
            .map_err(|e| EngineError::permanent(e.to_string()))?;

        // Desde aquí el directorio es del store
        self.owns_work_dir = false;

        Ok(ProgressEvent::Complete {
            id,
            filename,
            size: file_size,
        })
    }
}

impl Iterator for ProgressStream {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        if self.done {
            return None;
        }

        let limit = self.context.settings.timeout;
        let elapsed = self.elapsed();
        if elapsed >= limit {
            return Some(self.time_out());
        }

        let wait = self.context.settings.poll_interval.min(limit - elapsed);
        match self.events.recv_timeout(wait) {
            Ok(WorkerMessage::Event(event)) => Some(event),
            Ok(WorkerMessage::Finished(result)) => Some(self.finish(result)),
            Err(RecvTimeoutError::Timeout) => {
                if self.elapsed() >= limit {
                    Some(self.time_out())
                } else {
                    Some(ProgressEvent::Waiting)
                }
            }
            Err(RecvTimeoutError::Disconnected) => Some(self.finish(Err(EngineError::permanent(
                "Download worker stopped unexpectedly",
            )))),
        }
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        self.close();
    }
}
