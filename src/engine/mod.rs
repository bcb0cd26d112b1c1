//! # Motor Externo
//! src/engine/mod.rs
//!
//! Contrato con el motor de extracción/descarga. El motor es bloqueante y no
//! se puede interrumpir desde afuera; la única forma de cortarlo es que un
//! hook falle desde adentro de su propio callback.
//!
//! - `command`: adaptador que ejecuta un extractor de línea de comandos
//! - `formats`: resumen de formatos crudos en `MediaInfo`

pub mod command;
pub mod formats;

pub use command::CommandEngine;

use crate::error::EngineError;
use crate::stream::event::ProgressEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Selector de formato por defecto para video
pub const BEST_VIDEO_SELECTOR: &str = "bestvideo+bestaudio/best";

/// Selector de formato para solo audio
pub const BEST_AUDIO_SELECTOR: &str = "bestaudio/best";

/// Motor de extracción/descarga
pub trait Engine: Send + Sync {
    /// Extrae metadatos y formatos sin descargar
    fn extract_info(&self, url: &str) -> Result<MediaInfo, EngineError>;

    /// Descarga dentro de `work_dir`, reportando por `hooks`
    ///
    /// Un error retornado por un hook debe propagarse tal cual.
    fn download(
        &self,
        request: &DownloadRequest,
        work_dir: &Path,
        hooks: &DownloadHooks,
    ) -> Result<DownloadOutput, EngineError>;
}

/// Formato disponible de un medio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub format_id: String,
    pub ext: String,
    pub resolution: Option<String>,
    pub filesize: Option<u64>,
    pub has_audio: bool,
    pub has_video: bool,
    pub quality_label: Option<String>,
}

/// Metadatos de un medio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub video_formats: Vec<MediaFormat>,
    pub audio_formats: Vec<MediaFormat>,
}

/// Petición de descarga
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub format_id: String,
    pub audio_only: bool,
}

impl DownloadRequest {
    /// Video en el mejor formato
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format_id: "best".to_string(),
            audio_only: false,
        }
    }

    /// Solo audio, convertido a mp3
    pub fn audio(url: impl Into<String>) -> Self {
        Self {
            audio_only: true,
            ..Self::new(url)
        }
    }

    pub fn with_format(mut self, format_id: impl Into<String>) -> Self {
        self.format_id = format_id.into();
        self
    }

    /// Selector que se pasa al motor
    pub fn format_selector(&self) -> &str {
        if self.audio_only {
            BEST_AUDIO_SELECTOR
        } else if self.format_id.is_empty() || self.format_id == "best" {
            BEST_VIDEO_SELECTOR
        } else {
            &self.format_id
        }
    }

    /// Contenedor de salida al unir video y audio
    pub fn merge_format(&self) -> Option<&'static str> {
        if self.audio_only {
            None
        } else {
            Some("mp4")
        }
    }

    /// Codec de audio a extraer
    pub fn audio_codec(&self) -> Option<&'static str> {
        if self.audio_only {
            Some("mp3")
        } else {
            None
        }
    }

    /// Extensión del nombre de respaldo cuando el real no es ASCII
    pub fn fallback_extension(&self) -> &'static str {
        if self.audio_only {
            "mp3"
        } else {
            "mp4"
        }
    }
}

/// Resultado de una descarga del motor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOutput {
    /// Ruta final reportada por el motor, si la reportó
    pub file_path: Option<PathBuf>,
}

/// Actualización de transferencia
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        total_bytes_estimate: Option<u64>,
        speed: Option<f64>,
        eta: Option<u64>,
    },
    Finished,
}

/// Actualización de post-proceso
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessUpdate {
    Started { postprocessor: String },
    Processing,
    Finished,
}

type EventSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Hooks que el motor invoca durante una descarga
///
/// Ambos fallan con `EngineError::cancelled()` una vez levantada la bandera
/// de cancelación.
#[derive(Clone)]
pub struct DownloadHooks {
    cancel: Arc<AtomicBool>,
    sink: Option<EventSink>,
}

impl DownloadHooks {
    pub fn new<F>(cancel: Arc<AtomicBool>, sink: F) -> Self
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        Self {
            cancel,
            sink: Some(Arc::new(sink)),
        }
    }

    /// Hooks sin cola ni cancelación (camino request/response)
    pub fn detached() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            sink: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::cancelled())
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sink) = &self.sink {
            sink(event);
        }
    }

    pub fn progress(&self, update: &ProgressUpdate) -> Result<(), EngineError> {
        self.check()?;
        self.emit(ProgressEvent::from_progress(update));
        Ok(())
    }

    pub fn post_process(&self, update: &PostProcessUpdate) -> Result<(), EngineError> {
        self.check()?;
        if let Some(event) = ProgressEvent::from_post_process(update) {
            self.emit(event);
        }
        Ok(())
    }
}

impl fmt::Debug for DownloadHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadHooks")
            .field("cancelled", &self.is_cancelled())
            .field("attached", &self.sink.is_some())
            .finish()
    }
}
