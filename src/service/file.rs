//! # Descarga de Archivo
//! src/service/file.rs
//!
//! `FileDownload` es el resultado del camino request/response: metadatos más
//! un `FileStream` que lee el archivo en chunks. El directorio de trabajo se
//! borra cuando el stream se suelta, haya terminado, fallado o sido
//! abandonado por el cliente.

use crate::error::GateError;
use crate::workdir;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Archivo listo para transmitir
#[derive(Debug)]
pub struct FileDownload {
    filename: String,
    content_type: String,
    file_size: u64,
    stream: FileStream,
}

impl FileDownload {
    /// Abre `file_path` y toma posesión de `work_dir`
    ///
    /// Si no se puede abrir, el directorio se borra antes de retornar.
    pub fn open(
        file_path: &Path,
        work_dir: PathBuf,
        filename: String,
        content_type: String,
        chunk_size: usize,
    ) -> Result<Self, GateError> {
        let opened = File::open(file_path).and_then(|file| {
            let size = file.metadata()?.len();
            Ok((file, size))
        });

        let (file, file_size) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                workdir::remove_work_dir(&work_dir);
                return Err(GateError::Io(e));
            }
        };

        Ok(Self {
            filename,
            content_type,
            file_size,
            stream: FileStream {
                file: Some(file),
                work_dir,
                chunk_size: chunk_size.max(1),
                cleaned: false,
            },
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn work_dir(&self) -> &Path {
        &self.stream.work_dir
    }

    pub fn into_stream(self) -> FileStream {
        self.stream
    }
}

/// Lector del archivo que limpia su directorio al terminar
#[derive(Debug)]
pub struct FileStream {
    file: Option<File>,
    work_dir: PathBuf,
    chunk_size: usize,
    cleaned: bool,
}

impl FileStream {
    /// Cierra el archivo y borra el directorio; idempotente
    pub fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        // El archivo se cierra antes de borrar
        self.file = None;
        workdir::remove_work_dir(&self.work_dir);
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };

        match file.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.cleanup();
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                log::error!("error streaming file from {}: {}", self.work_dir.display(), e);
                self.cleanup();
                Err(e)
            }
        }
    }
}

impl Iterator for FileStream {
    type Item = io::Result<Vec<u8>>;

    /// Chunks de hasta `chunk_size` bytes
    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut filled = 0;

        while filled < chunk.len() {
            match self.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            }
        }

        if filled == 0 {
            return None;
        }
        chunk.truncate(filled);
        Some(Ok(chunk))
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        self.cleanup();
    }
}
