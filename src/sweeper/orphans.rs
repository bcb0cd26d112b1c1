//! # Barrido de Directorios Huérfanos
//! src/sweeper/orphans.rs
//!
//! Un directorio es huérfano cuando lleva el prefijo reservado, vive
//! directamente bajo la raíz temporal y su mtime supera la edad límite.
//! Son los que dejan las operaciones que vencieron antes de registrar nada.

use crate::workdir;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Borra los huérfanos bajo `root` y retorna cuántos se borraron
pub fn sweep_orphans(root: &Path, prefix: &str, max_age: Duration) -> usize {
    sweep_orphans_at(root, prefix, max_age, SystemTime::now())
}

/// `sweep_orphans` con un reloj explícito
pub fn sweep_orphans_at(root: &Path, prefix: &str, max_age: Duration, now: SystemTime) -> usize {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("error scanning {} for orphaned directories: {}", root.display(), e);
            return 0;
        }
    };

    let mut cleaned = 0;

    for entry in entries.filter_map(|entry| entry.ok()) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(prefix) {
            continue;
        }

        // file_type() no sigue symlinks
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => {}
            _ => continue,
        }

        let modified = match entry.metadata().and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                // Otro sweep pudo haberlo borrado ya
                log::debug!("could not check orphan directory {}: {}", entry.path().display(), e);
                continue;
            }
        };

        let age = now.duration_since(modified).unwrap_or_default();
        if age > max_age && workdir::remove_work_dir(&entry.path()) {
            cleaned += 1;
        }
    }

    if cleaned > 0 {
        log::info!("cleaned up {} orphaned temp directories", cleaned);
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_removes_only_old_prefixed_dirs() {
        let root = tempfile::tempdir().unwrap();
        let orphan = root.path().join("dlgate_orphan");
        let foreign = root.path().join("other_dir");
        let file = root.path().join("dlgate_file");
        fs::create_dir(&orphan).unwrap();
        fs::create_dir(&foreign).unwrap();
        fs::write(&file, b"x").unwrap();

        let later = SystemTime::now() + 2 * HOUR;
        assert_eq!(sweep_orphans_at(root.path(), "dlgate_", HOUR, later), 1);

        assert!(!orphan.exists());
        assert!(foreign.exists());
        assert!(file.exists());
    }

    #[test]
    fn test_keeps_young_dirs() {
        let root = tempfile::tempdir().unwrap();
        let young = root.path().join("dlgate_young");
        fs::create_dir(&young).unwrap();

        assert_eq!(sweep_orphans(root.path(), "dlgate_", HOUR), 0);
        assert!(young.exists());
    }

    #[test]
    fn test_missing_root_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("gone");
        assert_eq!(sweep_orphans(&missing, "dlgate_", HOUR), 0);
    }

    #[test]
    fn test_nested_contents_are_removed() {
        let root = tempfile::tempdir().unwrap();
        let orphan = root.path().join("dlgate_nested");
        fs::create_dir_all(orphan.join("a/b")).unwrap();
        fs::write(orphan.join("a/b/clip.mp4.part"), b"partial").unwrap();

        let later = SystemTime::now() + 2 * HOUR;
        assert_eq!(sweep_orphans_at(root.path(), "dlgate_", HOUR, later), 1);
        assert!(!orphan.exists());
    }
}
