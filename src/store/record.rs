//! # Registro de Descarga Completada
//! src/store/record.rs
//!
//! Define el ID opaco y los metadatos que el store guarda por descarga.

use crate::error::GateError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Bytes de entropía del ID (256 bits)
pub const DOWNLOAD_ID_BYTES: usize = 32;

/// ID opaco de una descarga completada
///
/// No se puede adivinar ni derivar sin haberlo recibido antes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DownloadId(String);

impl DownloadId {
    /// Genera un ID nuevo con un RNG criptográfico
    pub fn generate() -> Self {
        let mut bytes = [0u8; DOWNLOAD_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DownloadId {
    /// Solo un prefijo: el ID completo es una credencial
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "DownloadId({}…)", prefix)
    }
}

// Permite buscar en el mapa con `&str`
impl Borrow<str> for DownloadId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for DownloadId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Datos de una descarga terminada, antes de entrar al store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDownload {
    pub file_path: PathBuf,
    pub temp_dir: PathBuf,
    pub filename: String,
    pub file_size: u64,
    pub content_type: String,
}

impl NewDownload {
    /// Un campo vacío es un error del programador, se rechaza enseguida
    pub fn validate(&self) -> Result<(), GateError> {
        if self.file_path.as_os_str().is_empty() {
            return Err(GateError::StoreValidation("file_path"));
        }
        if self.temp_dir.as_os_str().is_empty() {
            return Err(GateError::StoreValidation("temp_dir"));
        }
        if self.filename.is_empty() {
            return Err(GateError::StoreValidation("filename"));
        }
        if self.content_type.is_empty() {
            return Err(GateError::StoreValidation("content_type"));
        }
        Ok(())
    }
}

/// Registro guardado en el store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDownloadRecord {
    pub id: DownloadId,
    pub file_path: PathBuf,
    pub temp_dir: PathBuf,
    pub filename: String,
    pub file_size: u64,
    pub content_type: String,
    pub created_at: SystemTime,
}

impl CompletedDownloadRecord {
    pub(crate) fn new(id: DownloadId, download: NewDownload, created_at: SystemTime) -> Self {
        Self {
            id,
            file_path: download.file_path,
            temp_dir: download.temp_dir,
            filename: download.filename,
            file_size: download.file_size,
            content_type: download.content_type,
            created_at,
        }
    }

    /// Edad del registro respecto a `now` (cero si el reloj retrocedió)
    pub fn age_at(&self, now: SystemTime) -> std::time::Duration {
        now.duration_since(self.created_at).unwrap_or_default()
    }
}
