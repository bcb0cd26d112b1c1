//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Contadores de timeouts, rechazos, éxitos y errores, más una ventana de
//! duraciones de operaciones exitosas para percentiles. Cada registro emite
//! una línea `METRIC <nombre> clave=valor ...` si está habilitado.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Máximo de duraciones guardadas para percentiles
const MAX_SAMPLES: usize = 10_000;

/// Collector de métricas thread-safe
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsData>>,
    start_time: Instant,
    log_enabled: bool,
}

/// Datos internos de métricas
#[derive(Debug, Default)]
struct MetricsData {
    timeouts: u64,
    rejections: u64,
    successes: u64,
    errors: u64,

    // === Streams ===
    streams_opened: u64,
    active_streams: u64,

    /// Duraciones de operaciones exitosas (en milisegundos)
    samples: Vec<u64>,
}

impl MetricsCollector {
    pub fn new(log_enabled: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsData {
                samples: Vec::with_capacity(1024),
                ..Default::default()
            })),
            start_time: Instant::now(),
            log_enabled,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(config.metrics_enabled)
    }

    fn lock(&self) -> MutexGuard<'_, MetricsData> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Una operación excedió su plazo
    pub fn record_timeout(&self, operation: &str, elapsed: Duration) {
        let total = {
            let mut data = self.lock();
            data.timeouts += 1;
            data.timeouts
        };

        if self.log_enabled {
            log::info!(
                "METRIC timeout operation={} elapsed={:.2}s total_timeouts={}",
                operation,
                elapsed.as_secs_f64(),
                total
            );
        }
    }

    /// La compuerta de admisión rechazó una operación
    pub fn record_rejection(&self, operation: &str) {
        let total = {
            let mut data = self.lock();
            data.rejections += 1;
            data.rejections
        };

        if self.log_enabled {
            log::info!("METRIC rejected operation={} total_rejections={}", operation, total);
        }
    }

    pub fn record_success(&self, operation: &str, elapsed: Duration) {
        let total = {
            let mut data = self.lock();
            data.successes += 1;

            // Si hay demasiadas muestras, eliminar la más antigua
            if data.samples.len() >= MAX_SAMPLES {
                data.samples.remove(0);
            }
            data.samples.push(elapsed.as_millis() as u64);

            data.successes
        };

        if self.log_enabled {
            log::debug!(
                "METRIC success operation={} elapsed={:.2}s total_success={}",
                operation,
                elapsed.as_secs_f64(),
                total
            );
        }
    }

    pub fn record_error(&self, operation: &str, error: &str, elapsed: Duration) {
        let total = {
            let mut data = self.lock();
            data.errors += 1;
            data.errors
        };

        if self.log_enabled {
            log::info!(
                "METRIC error operation={} error={:?} elapsed={:.2}s total_errors={}",
                operation,
                error,
                elapsed.as_secs_f64(),
                total
            );
        }
    }

    pub fn stream_opened(&self) {
        let mut data = self.lock();
        data.streams_opened += 1;
        data.active_streams += 1;
    }

    pub fn stream_closed(&self) {
        let mut data = self.lock();
        data.active_streams = data.active_streams.saturating_sub(1);
    }

    pub fn active_streams(&self) -> u64 {
        self.lock().active_streams
    }

    /// Calcula percentiles de duración
    fn percentiles(samples: &[u64]) -> (u64, u64, u64) {
        if samples.is_empty() {
            return (0, 0, 0);
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let len = sorted.len();
        (sorted[len * 50 / 100], sorted[len * 95 / 100], sorted[len * 99 / 100])
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let data = self.lock();
        let (p50, p95, p99) = Self::percentiles(&data.samples);

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            timeouts: data.timeouts,
            rejections: data.rejections,
            successes: data.successes,
            errors: data.errors,
            streams_opened: data.streams_opened,
            active_streams: data.active_streams,
            duration_p50_ms: p50,
            duration_p95_ms: p95,
            duration_p99_ms: p99,
        }
    }

    /// Pone los contadores en cero (los streams activos se conservan)
    pub fn reset(&self) {
        let mut data = self.lock();
        let active_streams = data.active_streams;
        *data = MetricsData {
            active_streams,
            ..Default::default()
        };
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Snapshot de métricas (para uso externo)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub timeouts: u64,
    pub rejections: u64,
    pub successes: u64,
    pub errors: u64,
    pub streams_opened: u64,
    pub active_streams: u64,
    pub duration_p50_ms: u64,
    pub duration_p95_ms: u64,
    pub duration_p99_ms: u64,
}
