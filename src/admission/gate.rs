//! # Compuerta de Admisión
//! src/admission/gate.rs
//!
//! Contador de permisos protegido por `Mutex` + `Condvar`.
//!
//! - `acquire(wait)` espera como máximo `wait` y luego falla con
//!   `CapacityExceeded`: es fail-fast, no una cola.
//! - `Permit` es RAII: se libera exactamente una vez, ya sea con
//!   `release()` explícito o al hacer drop.

use crate::error::GateError;
use serde::Serialize;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Estado interno protegido por el mutex
#[derive(Debug, Default)]
struct GateState {
    /// Permisos entregados y aún no liberados
    outstanding: usize,

    /// Contadores acumulados
    granted: u64,
    denied: u64,
    released: u64,
}

#[derive(Debug)]
struct GateInner {
    capacity: usize,
    default_wait: Duration,
    state: Mutex<GateState>,
    condvar: Condvar,
}

impl GateInner {
    /// Lock tolerante a poison: se usa en paths de liberación que no deben hacer panic
    fn lock(&self) -> MutexGuard<'_, GateState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    fn release_one(&self) {
        let mut state = self.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        state.released += 1;
        drop(state);

        self.condvar.notify_one();
    }
}

/// Snapshot de la compuerta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub capacity: usize,
    pub outstanding: usize,
    pub granted: u64,
    pub denied: u64,
    pub released: u64,
}

/// Compuerta de admisión compartida (clonar comparte el mismo contador)
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

impl AdmissionGate {
    /// Crea una compuerta con `capacity` permisos
    ///
    /// `default_wait` es la espera que usa `acquire_default()`.
    pub fn new(capacity: usize, default_wait: Duration) -> Self {
        assert!(capacity > 0, "AdmissionGate capacity must be > 0");

        Self {
            inner: Arc::new(GateInner {
                capacity,
                default_wait,
                state: Mutex::new(GateState::default()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Intenta obtener un permiso esperando como máximo `wait`
    pub fn acquire(&self, wait: Duration) -> Result<Permit, GateError> {
        let deadline = Instant::now() + wait;
        let mut state = self.inner.lock();

        while state.outstanding >= self.inner.capacity {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                state.denied += 1;
                log::warn!(
                    "admission denied: {}/{} operations in progress",
                    state.outstanding,
                    self.inner.capacity
                );
                return Err(GateError::CapacityExceeded {
                    capacity: self.inner.capacity,
                });
            }

            state = match self.inner.condvar.wait_timeout(state, remaining) {
                Ok((guard, _)) => guard,
                Err(poison) => poison.into_inner().0,
            };
        }

        state.outstanding += 1;
        state.granted += 1;
        log::debug!(
            "admission granted: {}/{} in progress",
            state.outstanding,
            self.inner.capacity
        );

        Ok(Permit {
            gate: Some(Arc::clone(&self.inner)),
        })
    }

    /// `acquire` con la espera configurada
    pub fn acquire_default(&self) -> Result<Permit, GateError> {
        self.acquire(self.inner.default_wait)
    }

    /// Intenta obtener un permiso sin esperar
    pub fn try_acquire(&self) -> Result<Permit, GateError> {
        self.acquire(Duration::ZERO)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Permisos en uso (snapshot, puede quedar viejo enseguida)
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    pub fn available(&self) -> usize {
        self.inner.capacity.saturating_sub(self.outstanding())
    }

    pub fn stats(&self) -> GateStats {
        let state = self.inner.lock();
        GateStats {
            capacity: self.inner.capacity,
            outstanding: state.outstanding,
            granted: state.granted,
            denied: state.denied,
            released: state.released,
        }
    }
}

/// Permiso de admisión
///
/// Se libera una sola vez: `release()` consume el permiso y el drop
/// posterior no hace nada.
#[derive(Debug)]
#[must_use = "el permiso se libera al hacer drop; soltarlo enseguida anula la admisión"]
pub struct Permit {
    gate: Option<Arc<GateInner>>,
}

impl Permit {
    /// Libera el permiso. Llamarlo más de una vez es inofensivo.
    pub fn release(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release_one();
        }
    }

    pub fn is_released(&self) -> bool {
        self.gate.is_none()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_acquire_up_to_capacity() {
        let gate = AdmissionGate::new(3, Duration::from_millis(10));

        let p1 = gate.try_acquire().unwrap();
        let p2 = gate.try_acquire().unwrap();
        let p3 = gate.try_acquire().unwrap();
        assert_eq!(gate.outstanding(), 3);
        assert_eq!(gate.available(), 0);

        assert!(matches!(
            gate.try_acquire(),
            Err(GateError::CapacityExceeded { capacity: 3 })
        ));

        drop((p1, p2, p3));
        assert_eq!(gate.outstanding(), 0);
    }

    #[test]
    fn test_denial_respects_short_wait() {
        let gate = AdmissionGate::new(1, Duration::from_millis(50));
        let _held = gate.acquire_default().unwrap();

        let start = Instant::now();
        let result = gate.acquire(Duration::from_millis(50));
        let elapsed = start.elapsed();

        assert!(result.is_err());
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_waiter_gets_released_permit() {
        let gate = AdmissionGate::new(1, Duration::from_millis(10));
        let held = gate.try_acquire().unwrap();

        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.acquire(Duration::from_secs(2)).is_ok())
        };

        thread::sleep(Duration::from_millis(50));
        drop(held);

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_release_is_idempotent() {
        let gate = AdmissionGate::new(2, Duration::from_millis(10));
        let mut permit = gate.try_acquire().unwrap();

        permit.release();
        permit.release();
        assert!(permit.is_released());
        drop(permit);

        let stats = gate.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.granted, 1);
        assert_eq!(stats.released, 1);
    }

    #[test]
    fn test_stats_count_denials() {
        let gate = AdmissionGate::new(1, Duration::ZERO);
        let _p = gate.try_acquire().unwrap();
        let _ = gate.try_acquire();
        let _ = gate.try_acquire();

        let stats = gate.stats();
        assert_eq!(stats.granted, 1);
        assert_eq!(stats.denied, 2);
    }

    #[test]
    fn test_permit_released_on_panic() {
        let gate = AdmissionGate::new(1, Duration::ZERO);

        let handle = {
            let gate = gate.clone();
            thread::spawn(move || {
                let _permit = gate.try_acquire().unwrap();
                panic!("boom");
            })
        };

        assert!(handle.join().is_err());
        assert_eq!(gate.outstanding(), 0);
        assert!(gate.try_acquire().is_ok());
    }
}
