//! # Reporte de Salud
//! src/service/health.rs

use crate::admission::GateStats;
use crate::executor::PoolStats;
use crate::metrics::MetricsSnapshot;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Acepta operaciones
    Healthy,

    /// Sin permisos libres: las operaciones nuevas se rechazan
    Busy,

    /// Sweeper detenido o pool cerrado
    Degraded,
}

/// Snapshot del servicio
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub admission: GateStats,
    pub pool: PoolStats,
    pub stored_downloads: usize,
    pub sweeper_running: bool,
    pub metrics: MetricsSnapshot,
}

impl HealthReport {
    pub fn status_for(admission: &GateStats, pool_closed: bool, sweeper_running: bool) -> HealthStatus {
        if pool_closed || !sweeper_running {
            HealthStatus::Degraded
        } else if admission.outstanding >= admission.capacity {
            HealthStatus::Busy
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}
