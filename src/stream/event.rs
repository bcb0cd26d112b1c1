//! # Eventos de Progreso
//! src/stream/event.rs
//!
//! Variantes que produce un `ProgressStream`, serializadas con una
//! etiqueta `status`:
//!
//! ```json
//! {"status":"downloading","percent":42.5,"downloaded":425,"total":1000,"speed":1200.0,"eta":3}
//! {"status":"processing","percent":100.0,"message":"Converting..."}
//! {"status":"waiting"}
//! {"status":"complete","download_id":"...","filename":"a.mp4","file_size":1000}
//! {"status":"error","kind":"timeout","message":"...","retryable":true}
//! ```

use crate::engine::{PostProcessUpdate, ProgressUpdate};
use crate::error::{EngineError, FailureKind};
use crate::store::DownloadId;
use serde::Serialize;
use std::time::Duration;

pub const MSG_PROCESSING: &str = "Processing file...";
pub const MSG_CONVERTING: &str = "Converting...";

/// Clasificación de un error terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    Transient,
    Permanent,
    Timeout,
}

/// Evento de progreso de una operación
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    Downloading {
        percent: f64,
        downloaded: u64,
        total: u64,
        speed: Option<f64>,
        eta: Option<u64>,
    },
    Processing {
        percent: f64,
        message: String,
    },
    Waiting,
    Complete {
        #[serde(rename = "download_id")]
        id: DownloadId,
        filename: String,
        #[serde(rename = "file_size")]
        size: u64,
    },
    Error {
        kind: ErrorClass,
        message: String,
        retryable: bool,
    },
}

impl ProgressEvent {
    /// Mapea una actualización de transferencia del motor
    pub fn from_progress(update: &ProgressUpdate) -> Self {
        match *update {
            ProgressUpdate::Downloading {
                downloaded_bytes,
                total_bytes,
                total_bytes_estimate,
                speed,
                eta,
            } => {
                let total = total_bytes.or(total_bytes_estimate).unwrap_or(0);
                let percent = if total > 0 {
                    round_one_decimal(downloaded_bytes as f64 / total as f64 * 100.0)
                } else {
                    0.0
                };

                ProgressEvent::Downloading {
                    percent,
                    downloaded: downloaded_bytes,
                    total,
                    speed,
                    eta,
                }
            }
            ProgressUpdate::Finished => Self::processing(MSG_PROCESSING),
        }
    }

    /// Mapea una actualización de post-proceso; solo el inicio produce evento
    pub fn from_post_process(update: &PostProcessUpdate) -> Option<Self> {
        match update {
            PostProcessUpdate::Started { .. } => Some(Self::processing(MSG_CONVERTING)),
            PostProcessUpdate::Processing | PostProcessUpdate::Finished => None,
        }
    }

    pub fn processing(message: &str) -> Self {
        ProgressEvent::Processing {
            percent: 100.0,
            message: message.to_string(),
        }
    }

    /// Error terminal a partir de un error del motor
    pub fn from_engine_error(error: &EngineError) -> Self {
        let kind = match error.kind() {
            FailureKind::Transient => ErrorClass::Transient,
            FailureKind::Permanent | FailureKind::Cancelled => ErrorClass::Permanent,
        };

        ProgressEvent::Error {
            kind,
            message: error.message().to_string(),
            retryable: error.is_retryable(),
        }
    }

    /// Error terminal por exceder la duración máxima del stream
    pub fn timed_out(limit: Duration) -> Self {
        ProgressEvent::Error {
            kind: ErrorClass::Timeout,
            message: format!("Download timed out after {} seconds", limit.as_secs()),
            retryable: true,
        }
    }

    /// `complete` y `error` cierran el stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }

    /// Valor de la etiqueta `status`
    pub fn status(&self) -> &'static str {
        match self {
            ProgressEvent::Downloading { .. } => "downloading",
            ProgressEvent::Processing { .. } => "processing",
            ProgressEvent::Waiting => "waiting",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> String {
        // Solo strings, números y un ID transparente: no puede fallar
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"status\":\"{}\"}}", self.status()))
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
