//! # Store de un Solo Uso
//! src/store/completed.rs
//!
//! - `store()` primero expulsa todo lo expirado, luego inserta y recorta al
//!   máximo expulsando el más viejo por `created_at`, en un loop.
//! - `take()` quita y retorna de forma atómica: un segundo `take` con el
//!   mismo ID retorna `None`.
//!
//! El lock cubre solo operaciones en memoria. Los directorios de las
//! víctimas se borran después de soltarlo.

use crate::error::GateError;
use crate::store::record::{CompletedDownloadRecord, DownloadId, NewDownload};
use crate::workdir;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

/// Configuración del store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Tiempo de vida de un registro sin reclamar
    pub ttl: Duration,

    /// Máximo de registros en memoria
    pub max_entries: usize,
}

impl StoreConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            ttl: config.store_ttl(),
            max_entries: config.max_completed_downloads,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 100,
        }
    }
}

type RecordMap = HashMap<DownloadId, CompletedDownloadRecord>;

/// Store compartido de descargas completadas
#[derive(Clone)]
pub struct CompletedDownloadStore {
    config: StoreConfig,
    records: Arc<Mutex<RecordMap>>,
}

impl CompletedDownloadStore {
    pub fn new(config: StoreConfig) -> Self {
        assert!(config.max_entries > 0, "store max_entries must be > 0");

        Self {
            config,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordMap> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Guarda una descarga y retorna su ID
    pub fn store(&self, download: NewDownload) -> Result<DownloadId, GateError> {
        self.store_at(download, SystemTime::now())
    }

    /// `store` con un reloj explícito
    pub fn store_at(&self, download: NewDownload, now: SystemTime) -> Result<DownloadId, GateError> {
        download.validate()?;

        let id = DownloadId::generate();
        let record = CompletedDownloadRecord::new(id.clone(), download, now);

        let (expired, evicted, evicted_self) = {
            let mut records = self.lock();

            let expired = Self::collect_expired_locked(&mut records, now, self.config.ttl);

            records.insert(id.clone(), record);

            let mut evicted = Vec::new();
            let mut evicted_self = false;
            while records.len() > self.config.max_entries {
                match Self::pop_oldest_locked(&mut records) {
                    Some(victim) => {
                        evicted_self |= victim.id == id;
                        evicted.push(victim.temp_dir);
                    }
                    None => break,
                }
            }

            (expired, evicted, evicted_self)
        };

        if !evicted.is_empty() {
            log::warn!(
                "evicted {} oldest download(s) due to capacity limit ({})",
                evicted.len(),
                self.config.max_entries
            );
        }

        let cleaned = Self::cleanup_dirs(expired) + Self::cleanup_dirs(evicted);
        if cleaned > 0 {
            log::info!("cleaned up {} download(s) while storing", cleaned);
        }

        // Más viejo que todo lo guardado (p. ej. el reloj retrocedió): su ID no sirve
        if evicted_self {
            log::warn!("download {:?} was the oldest record and got evicted on store", id);
            return Err(GateError::EvictedOnStore {
                max_entries: self.config.max_entries,
            });
        }

        Ok(id)
    }

    /// Quita y retorna el registro (un solo uso)
    pub fn take(&self, id: &str) -> Option<CompletedDownloadRecord> {
        self.take_at(id, SystemTime::now())
    }

    /// `take` con un reloj explícito. Un registro expirado no se entrega.
    pub fn take_at(&self, id: &str, now: SystemTime) -> Option<CompletedDownloadRecord> {
        let record = self.lock().remove(id)?;

        if record.age_at(now) > self.config.ttl {
            log::debug!("download {:?} expired before being claimed", record.id);
            workdir::remove_work_dir(&record.temp_dir);
            return None;
        }

        Some(record)
    }

    /// Expulsa todos los registros expirados y borra sus directorios
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(SystemTime::now())
    }

    pub fn evict_expired_at(&self, now: SystemTime) -> usize {
        let expired = {
            let mut records = self.lock();
            Self::collect_expired_locked(&mut records, now, self.config.ttl)
        };

        let count = Self::cleanup_dirs(expired);
        if count > 0 {
            log::info!("cleaned up {} expired download(s)", count);
        }
        count
    }

    /// Quita los expirados del mapa (con el lock tomado) y retorna sus directorios
    fn collect_expired_locked(records: &mut RecordMap, now: SystemTime, ttl: Duration) -> Vec<PathBuf> {
        let expired: Vec<DownloadId> = records
            .iter()
            .filter(|(_, record)| record.age_at(now) > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .iter()
            .filter_map(|id| records.remove(id))
            .map(|record| record.temp_dir)
            .collect()
    }

    fn pop_oldest_locked(records: &mut RecordMap) -> Option<CompletedDownloadRecord> {
        let oldest = records
            .values()
            .min_by_key(|record| record.created_at)
            .map(|record| record.id.clone())?;

        records.remove(&oldest)
    }

    fn cleanup_dirs(dirs: Vec<PathBuf>) -> usize {
        let count = dirs.len();
        for dir in dirs {
            workdir::remove_work_dir(&dir);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn download_in(root: &Path, name: &str) -> NewDownload {
        let temp_dir = root.join(format!("dlgate_{}", name));
        fs::create_dir_all(&temp_dir).unwrap();
        let file_path = temp_dir.join("video.mp4");
        fs::write(&file_path, b"data").unwrap();

        NewDownload {
            file_path,
            temp_dir,
            filename: "video.mp4".to_string(),
            file_size: 4,
            content_type: "video/mp4".to_string(),
        }
    }

    fn store(ttl_secs: u64, max_entries: usize) -> CompletedDownloadStore {
        CompletedDownloadStore::new(StoreConfig {
            ttl: Duration::from_secs(ttl_secs),
            max_entries,
        })
    }

    #[test]
    fn test_store_then_take_returns_same_record() {
        let root = tempfile::tempdir().unwrap();
        let store = store(300, 10);
        let download = download_in(root.path(), "a");

        let id = store.store(download.clone()).unwrap();
        let record = store.take(id.as_str()).unwrap();

        assert_eq!(record.id, id);
        assert_eq!(record.file_path, download.file_path);
        assert_eq!(record.temp_dir, download.temp_dir);
        assert_eq!(record.filename, download.filename);
        assert_eq!(record.file_size, download.file_size);
        assert_eq!(record.content_type, download.content_type);
    }

    #[test]
    fn test_take_is_single_use() {
        let root = tempfile::tempdir().unwrap();
        let store = store(300, 10);
        let id = store.store(download_in(root.path(), "a")).unwrap();

        assert!(store.take(id.as_str()).is_some());
        assert!(store.take(id.as_str()).is_none());
        assert!(store.take("never-issued").is_none());
    }

    #[test]
    fn test_take_does_not_touch_files() {
        let root = tempfile::tempdir().unwrap();
        let store = store(300, 10);
        let download = download_in(root.path(), "a");
        let id = store.store(download.clone()).unwrap();

        store.take(id.as_str()).unwrap();
        assert!(download.file_path.exists());
    }

    #[test]
    fn test_store_rejects_invalid_record() {
        let store = store(300, 10);
        let result = store.store(NewDownload {
            file_path: PathBuf::from("/tmp/x/file.mp4"),
            temp_dir: PathBuf::from("/tmp/x"),
            filename: String::new(),
            file_size: 1,
            content_type: "video/mp4".to_string(),
        });

        assert!(matches!(result, Err(GateError::StoreValidation("filename"))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest_in_a_loop() {
        let root = tempfile::tempdir().unwrap();
        let store = store(3600, 3);
        let base = SystemTime::now();

        let mut ids = Vec::new();
        for i in 0..8u64 {
            let download = download_in(root.path(), &i.to_string());
            ids.push(store.store_at(download, base + Duration::from_secs(i)).unwrap());
        }

        assert_eq!(store.len(), 3);
        for id in &ids[..5] {
            assert!(!store.contains(id.as_str()));
        }
        for id in &ids[5..] {
            assert!(store.contains(id.as_str()));
        }

        // Directorios de los expulsados borrados, los vivos intactos
        assert!(!root.path().join("dlgate_0").exists());
        assert!(root.path().join("dlgate_7").exists());
    }

    #[test]
    fn test_store_reports_record_evicted_on_insert() {
        let root = tempfile::tempdir().unwrap();
        let store = store(3600, 2);
        let base = SystemTime::now();

        store.store_at(download_in(root.path(), "b"), base).unwrap();
        store.store_at(download_in(root.path(), "c"), base).unwrap();

        // El reloj retrocedió: el nuevo es el más viejo y sale enseguida
        let stale = download_in(root.path(), "stale");
        let result = store.store_at(stale.clone(), base - Duration::from_secs(30));

        assert!(matches!(result, Err(GateError::EvictedOnStore { max_entries: 2 })));
        assert_eq!(store.len(), 2);
        assert!(!stale.temp_dir.exists());
        assert!(root.path().join("dlgate_b").exists());
    }

    #[test]
    fn test_take_of_expired_record_returns_none() {
        let root = tempfile::tempdir().unwrap();
        let store = store(5, 10);
        let base = SystemTime::now();
        let download = download_in(root.path(), "old");
        let temp_dir = download.temp_dir.clone();

        let id = store.store_at(download, base).unwrap();
        assert!(store.take_at(id.as_str(), base + Duration::from_secs(6)).is_none());
        assert!(!temp_dir.exists());
    }

    #[test]
    fn test_evict_expired_removes_only_old_records() {
        let root = tempfile::tempdir().unwrap();
        let store = store(5, 10);
        let base = SystemTime::now();

        let old = store.store_at(download_in(root.path(), "old"), base).unwrap();
        let fresh = store
            .store_at(download_in(root.path(), "fresh"), base + Duration::from_secs(4))
            .unwrap();

        assert_eq!(store.evict_expired_at(base + Duration::from_secs(6)), 1);
        assert!(!store.contains(old.as_str()));
        assert!(store.contains(fresh.as_str()));
        assert!(!root.path().join("dlgate_old").exists());
    }

    #[test]
    fn test_cleanup_tolerates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let store = store(5, 10);
        let base = SystemTime::now();
        let download = download_in(root.path(), "gone");
        fs::remove_dir_all(&download.temp_dir).unwrap();

        store.store_at(download, base).unwrap();
        assert_eq!(store.evict_expired_at(base + Duration::from_secs(10)), 1);
        assert!(store.is_empty());
    }
}
