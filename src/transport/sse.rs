//! # Framing SSE
//! src/transport/sse.rs
//!
//! Convierte un `ProgressStream` en frames Server-Sent Events:
//!
//! ```text
//! data: {"status":"downloading","percent":12.5,...}\n\n
//! ```
//!
//! Si escribir falla (cliente desconectado) el stream interno se cierra
//! enseguida, lo que cancela la descarga y libera el permiso.

use crate::stream::{ProgressEvent, ProgressStream};
use std::io::{self, Write};

/// Formatea un evento como frame SSE
pub fn frame(event: &ProgressEvent) -> String {
    format!("data: {}\n\n", event.to_json())
}

/// Adaptador SSE sobre un stream de progreso
pub struct SseStream {
    inner: ProgressStream,
}

impl SseStream {
    pub fn new(inner: ProgressStream) -> Self {
        Self { inner }
    }

    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    /// Escribe todos los frames en `out` y retorna el último evento
    ///
    /// Un error de escritura cierra el stream y se propaga.
    pub fn pump<W: Write>(&mut self, out: &mut W) -> io::Result<Option<ProgressEvent>> {
        let mut last = None;

        while let Some(event) = self.inner.next() {
            let written = out
                .write_all(frame(&event).as_bytes())
                .and_then(|_| out.flush());

            if let Err(e) = written {
                log::info!("client disconnected, cancelling download for {}", self.inner.request().url);
                self.close();
                return Err(e);
            }

            last = Some(event);
        }

        Ok(last)
    }
}

impl Iterator for SseStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.inner.next().map(|event| frame(&event))
    }
}

impl Drop for SseStream {
    fn drop(&mut self) {
        self.close();
    }
}
