//! # Pool de Workers con Timeout
//! src/executor/pool.rs
//!
//! Ejecuta trabajo bloqueante en un pool fijo bajo un plazo.
//!
//! ## Semántica del timeout
//!
//! Al vencer el plazo se retorna `Timeout` **sin esperar** a que el trabajo
//! termine: el worker sigue ocupado hasta que el motor externo corte por su
//! propio timeout interno. Es una fuga acotada, no una cancelación. Por eso
//! el pool debe ser más grande que la capacidad de admisión: los workers
//! extra absorben a los huérfanos.
//!
//! Un trabajo que vence todavía en la cola se descarta: ningún worker lo
//! ejecuta después.

use crate::admission::AdmissionGate;
use crate::error::GateError;
use crate::executor::queue::{Task, WorkQueue};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Estadísticas del pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Threads del pool
    pub size: usize,

    /// Workers ejecutando algo (incluye huérfanos de timeouts)
    pub busy: usize,

    /// Trabajos esperando un worker libre
    pub queued: usize,
}

/// Executor acotado: admisión + pool fijo + plazo por operación
pub struct BoundedExecutor {
    gate: AdmissionGate,
    queue: WorkQueue,
    size: usize,
    busy: Arc<AtomicUsize>,
}

impl BoundedExecutor {
    /// Crea el executor e inicia `workers` threads
    pub fn new(gate: AdmissionGate, workers: usize) -> Result<Self, GateError> {
        assert!(workers > 0, "BoundedExecutor needs at least one worker");

        if workers <= gate.capacity() {
            log::warn!(
                "worker pool ({}) is not larger than admission capacity ({}); timed-out work can starve new requests",
                workers,
                gate.capacity()
            );
        }

        let executor = Self {
            gate,
            queue: WorkQueue::new(),
            size: workers,
            busy: Arc::new(AtomicUsize::new(0)),
        };

        executor.spawn_workers()?;

        Ok(executor)
    }

    /// Inicia los workers
    fn spawn_workers(&self) -> Result<(), GateError> {
        for i in 0..self.size {
            let name = format!("dlgate-worker-{}", i);
            let queue = self.queue.clone();
            let busy = Arc::clone(&self.busy);

            thread::Builder::new()
                .name(name.clone())
                .spawn(move || Self::worker_loop(name, queue, busy))?;
        }

        Ok(())
    }

    /// Loop principal del worker
    fn worker_loop(name: String, queue: WorkQueue, busy: Arc<AtomicUsize>) {
        log::debug!("worker {} started", name);

        while let Some(task) = queue.dequeue() {
            busy.fetch_add(1, Ordering::SeqCst);
            task();
            busy.fetch_sub(1, Ordering::SeqCst);
        }

        log::debug!("worker {} stopped", name);
    }

    /// Ejecuta `work` en el pool esperando como máximo `deadline`
    ///
    /// Errores: `CapacityExceeded` si no hay permiso, `Timeout` si vence el
    /// plazo (el trabajo puede seguir corriendo), o el error del propio `work`
    /// (normalmente `GateError::Engine`).
    /// El permiso se libera en todos los casos antes de retornar.
    pub fn run_with_timeout<T, F>(&self, work: F, deadline: Duration) -> Result<T, GateError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, GateError> + Send + 'static,
    {
        let permit = self.gate.acquire_default()?;

        let result = self.submit_and_wait(work, deadline);

        drop(permit);
        result
    }

    fn submit_and_wait<T, F>(&self, work: F, deadline: Duration) -> Result<T, GateError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, GateError> + Send + 'static,
    {
        // Capacidad 1: el worker nunca bloquea al enviar aunque nadie escuche
        let (tx, rx) = mpsc::sync_channel(1);

        // Lo reclama primero el worker (al empezar) o el que espera (al vencer)
        let claimed = Arc::new(AtomicBool::new(false));
        let task_claimed = Arc::clone(&claimed);

        let task: Task = Box::new(move || {
            if task_claimed.swap(true, Ordering::SeqCst) {
                log::debug!("skipping work abandoned before it started");
                return;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(work));
            let _ = tx.send(outcome);
        });

        self.queue.enqueue(task).map_err(|_| GateError::PoolClosed)?;

        let start = Instant::now();
        match rx.recv_timeout(deadline) {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                log::error!("work panicked after {:?}", start.elapsed());
                Err(GateError::WorkerPanicked)
            }
            Err(RecvTimeoutError::Timeout) => {
                if claimed.swap(true, Ordering::SeqCst) {
                    log::warn!(
                        "operation exceeded deadline of {:?}; worker left running ({} busy)",
                        deadline,
                        self.busy.load(Ordering::SeqCst)
                    );
                } else {
                    log::warn!(
                        "operation exceeded deadline of {:?} while queued; it will not run",
                        deadline
                    );
                }
                Err(GateError::Timeout(deadline))
            }
            // El trabajo se descartó sin ejecutarse
            Err(RecvTimeoutError::Disconnected) => Err(GateError::PoolClosed),
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.size,
            busy: self.busy.load(Ordering::SeqCst),
            queued: self.queue.len(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Cierra la cola; los workers terminan al acabar su trabajo actual
    ///
    /// No espera a los huérfanos: pueden seguir bloqueados en el motor.
    pub fn shutdown(&self) {
        if !self.queue.is_closed() {
            log::info!("shutting down worker pool ({} busy)", self.busy.load(Ordering::SeqCst));
            self.queue.close();
        }
    }
}

impl Drop for BoundedExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
