//! # Thread del Sweeper
//! src/sweeper/worker.rs
//!
//! Cada período ejecuta dos barridos independientes:
//! 1. Expiración por TTL del store
//! 2. Directorios huérfanos bajo la raíz temporal
//!
//! Se detiene con una señal por canal y se espera un tiempo acotado.

use crate::config::Config;
use crate::error::GateError;
use crate::store::CompletedDownloadStore;
use crate::sweeper::orphans;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Configuración del sweeper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    pub period: Duration,
    pub join_timeout: Duration,
    pub temp_root: PathBuf,
    pub prefix: String,
    pub orphan_age: Duration,
}

impl SweeperConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            period: config.sweep_period(),
            join_timeout: config.sweeper_join(),
            temp_root: config.temp_root(),
            prefix: config.temp_prefix.clone(),
            orphan_age: config.orphan_age(),
        }
    }
}

/// Resultado de un ciclo
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Registros del store expirados por TTL
    pub expired: usize,

    /// Directorios huérfanos borrados
    pub orphans: usize,
}

/// Sweeper en segundo plano
pub struct OrphanSweeper {
    store: CompletedDownloadStore,
    config: SweeperConfig,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OrphanSweeper {
    /// Crea el sweeper sin iniciar el thread
    pub fn new(store: CompletedDownloadStore, config: SweeperConfig) -> Self {
        Self {
            store,
            config,
            stop_tx: None,
            handle: None,
        }
    }

    /// Crea e inicia el sweeper
    pub fn start(store: CompletedDownloadStore, config: SweeperConfig) -> Result<Self, GateError> {
        let mut sweeper = Self::new(store, config);
        sweeper.spawn()?;
        Ok(sweeper)
    }

    fn spawn(&mut self) -> Result<(), GateError> {
        if self.handle.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let store = self.store.clone();
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("dlgate-sweeper".to_string())
            .spawn(move || {
                log::debug!("sweeper started (period {:?})", config.period);

                loop {
                    match stop_rx.recv_timeout(config.period) {
                        Err(RecvTimeoutError::Timeout) => {
                            Self::sweep(&store, &config);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                log::debug!("sweeper stopped");
            })?;

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    fn sweep(store: &CompletedDownloadStore, config: &SweeperConfig) -> SweepReport {
        let expired = store.evict_expired();
        let orphans = orphans::sweep_orphans(&config.temp_root, &config.prefix, config.orphan_age);

        SweepReport { expired, orphans }
    }

    /// Ejecuta un ciclo completo en el thread actual
    pub fn sweep_once(&self) -> SweepReport {
        Self::sweep(&self.store, &self.config)
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Señala la detención y espera como máximo `join_timeout`
    ///
    /// Retorna `false` si el thread no terminó a tiempo.
    pub fn stop(&mut self) -> bool {
        // Soltar el Sender también despierta al thread
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + self.config.join_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                log::error!("sweeper thread panicked");
            }
            true
        } else {
            log::warn!("sweeper did not stop within {:?}", self.config.join_timeout);
            false
        }
    }
}

impl Drop for OrphanSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
