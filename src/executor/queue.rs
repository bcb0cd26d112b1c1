//! # Cola de Trabajos
//! src/executor/queue.rs
//!
//! Cola FIFO thread-safe que alimenta a los workers del pool.
//! Los workers bloquean en `dequeue()` hasta que hay trabajo o la cola se cierra.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Unidad de trabajo ya empaquetada (resultado enviado por su propio canal)
pub type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    tasks: VecDeque<Task>,
    closed: bool,
}

/// Cola de trabajos compartida
#[derive(Clone)]
pub struct WorkQueue {
    state: Arc<Mutex<QueueState>>,
    condvar: Arc<Condvar>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                tasks: VecDeque::new(),
                closed: false,
            })),
            condvar: Arc::new(Condvar::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Encola un trabajo
    ///
    /// Retorna el trabajo de vuelta si la cola ya está cerrada.
    pub fn enqueue(&self, task: Task) -> Result<(), Task> {
        let mut state = self.lock();
        if state.closed {
            return Err(task);
        }

        state.tasks.push_back(task);

        // Notificar a un worker esperando
        self.condvar.notify_one();

        Ok(())
    }

    /// Desencola el siguiente trabajo
    ///
    /// Bloquea hasta que haya uno. Retorna `None` cuando la cola está
    /// cerrada y vacía.
    pub fn dequeue(&self) -> Option<Task> {
        let mut state = self.lock();

        loop {
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            if state.closed {
                return None;
            }

            state = match self.condvar.wait(state) {
                Ok(guard) => guard,
                Err(poison) => poison.into_inner(),
            };
        }
    }

    /// Cierra la cola: los trabajos ya encolados se siguen entregando
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);

        self.condvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Trabajos esperando un worker libre
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
