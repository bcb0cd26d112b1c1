//! # Directorios de Trabajo
//! src/workdir.rs
//!
//! Cada invocación del motor escribe en su propio directorio temporal
//! `<prefijo><aleatorio>` bajo la raíz configurada. El prefijo es lo único
//! que permite al sweeper reconocer directorios huérfanos.

use crate::error::GateError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extensiones de archivos finales que produce el motor
const MEDIA_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mp3", "m4a", "opus", "ogg", "wav"];

/// Archivos intermedios que el motor deja mientras procesa
const INTERMEDIATE_EXTENSIONS: &[&str] = &["part", "temp", "ytdl", "frag"];

/// Crea un directorio de trabajo nuevo
///
/// Un fallo aquí (disco lleno, permisos) es fatal para la operación.
pub fn create_work_dir(root: &Path, prefix: &str) -> Result<PathBuf, GateError> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(root)
        .map_err(|source| GateError::WorkDir {
            path: root.to_path_buf(),
            source,
        })?;

    // A partir de aquí el borrado lo maneja el store o el sweeper
    let path = dir.keep();
    log::debug!("created work directory {}", path.display());
    Ok(path)
}

/// Borra un directorio de trabajo
///
/// "Ya no existe" es éxito: el store y el sweeper pueden competir por el
/// mismo directorio. Otros fallos se registran y no se propagan.
pub fn remove_work_dir(path: &Path) -> bool {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            log::debug!("cleaned up work directory {}", path.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            log::warn!("failed to clean up work directory {}: {}", path.display(), e);
            false
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// `hint` canónico si es un archivo que realmente vive dentro de `dir`
fn contained_file(dir: &Path, hint: &Path) -> Option<PathBuf> {
    let dir = fs::canonicalize(dir).ok()?;
    let hint = fs::canonicalize(hint).ok()?;
    (hint.starts_with(&dir) && hint.is_file()).then_some(hint)
}

/// Busca el archivo final dentro del directorio de trabajo
///
/// Orden: la pista del motor si existe dentro de `dir`; luego el primer
/// archivo con extensión de media; luego cualquier archivo que no sea
/// intermedio.
pub fn locate_output_file(dir: &Path, hint: Option<&Path>) -> Option<PathBuf> {
    if let Some(hint) = hint.and_then(|hint| contained_file(dir, hint)) {
        return Some(hint);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let preferred = files.iter().find(|path| {
        extension_of(path)
            .map(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    });
    if let Some(found) = preferred {
        return Some(found.clone());
    }

    files.into_iter().find(|path| {
        extension_of(path)
            .map(|ext| !INTERMEDIATE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(true)
    })
}

/// Content-Type según la extensión del archivo
pub fn content_type_for(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("opus") => "audio/opus",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// Nombre de archivo solo ASCII para cabeceras y eventos
///
/// Si no queda nada, usa `download.<fallback_ext>`.
pub fn ascii_filename(path: &Path, fallback_ext: &str) -> String {
    let name: String = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect();

    if name.trim().is_empty() {
        format!("download.{}", fallback_ext)
    } else {
        name
    }
}

/// Verifica que `dir` sea un hijo directo de `root` con el prefijo reservado
pub fn is_managed_dir(root: &Path, prefix: &str, dir: &Path) -> bool {
    let parent_ok = dir.parent().map(|parent| parent == root).unwrap_or(false);
    let name_ok = dir
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(prefix) && name.len() > prefix.len())
        .unwrap_or(false);

    parent_ok && name_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_work_dir_uses_prefix() {
        let root = tempfile::tempdir().unwrap();
        let dir = create_work_dir(root.path(), "dlgate_").unwrap();

        assert!(dir.is_dir());
        assert!(is_managed_dir(root.path(), "dlgate_", &dir));
    }

    #[test]
    fn test_create_work_dir_fails_on_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("does/not/exist");

        assert!(matches!(
            create_work_dir(&missing, "dlgate_"),
            Err(GateError::WorkDir { .. })
        ));
    }

    #[test]
    fn test_remove_work_dir_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let dir = create_work_dir(root.path(), "dlgate_").unwrap();
        fs::write(dir.join("video.mp4"), b"x").unwrap();

        assert!(remove_work_dir(&dir));
        assert!(!dir.exists());
        assert!(remove_work_dir(&dir));
    }

    #[test]
    fn test_locate_prefers_hint() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        fs::write(dir.path().join("b.bin"), b"x").unwrap();

        let hint = dir.path().join("b.bin");
        assert_eq!(
            locate_output_file(dir.path(), Some(&hint)),
            Some(fs::canonicalize(&hint).unwrap())
        );
    }

    #[test]
    fn test_locate_ignores_hint_escaping_with_parent_dir() {
        let root = tempfile::tempdir().unwrap();
        let work = root.path().join("dlgate_work");
        let elsewhere = root.path().join("elsewhere");
        fs::create_dir(&work).unwrap();
        fs::create_dir(&elsewhere).unwrap();
        fs::write(work.join("a.mp4"), b"x").unwrap();
        fs::write(elsewhere.join("x.mp4"), b"x").unwrap();

        // Empieza con `work` pero apunta afuera
        let sneaky = work.join("..").join("elsewhere").join("x.mp4");
        assert!(sneaky.starts_with(&work));

        assert_eq!(
            locate_output_file(&work, Some(&sneaky)),
            Some(work.join("a.mp4"))
        );
    }

    #[test]
    fn test_locate_ignores_hint_outside_dir() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        fs::write(other.path().join("b.mp4"), b"x").unwrap();

        let outside = other.path().join("b.mp4");
        assert_eq!(
            locate_output_file(dir.path(), Some(&outside)),
            Some(dir.path().join("a.mp4"))
        );
    }

    #[test]
    fn test_locate_prefers_media_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.info.json"), b"{}").unwrap();
        fs::write(dir.path().join("b.webm"), b"x").unwrap();

        let missing_hint = dir.path().join("gone.mp4");
        assert_eq!(
            locate_output_file(dir.path(), Some(&missing_hint)),
            Some(dir.path().join("b.webm"))
        );
    }

    #[test]
    fn test_locate_skips_intermediate_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.part"), b"x").unwrap();
        fs::write(dir.path().join("b.ytdl"), b"x").unwrap();
        assert_eq!(locate_output_file(dir.path(), None), None);

        fs::write(dir.path().join("c.flac"), b"x").unwrap();
        assert_eq!(locate_output_file(dir.path(), None), Some(dir.path().join("c.flac")));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("x.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("x.mkv")), "video/x-matroska");
        assert_eq!(content_type_for(Path::new("x.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("x.bin")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_ascii_filename() {
        assert_eq!(ascii_filename(Path::new("/t/Clip 01.mp4"), "mp4"), "Clip 01.mp4");
        assert_eq!(ascii_filename(Path::new("/t/Canción.mp3"), "mp3"), "Cancin.mp3");
        assert_eq!(ascii_filename(Path::new("/t/日本"), "mp4"), "download.mp4");
    }

    #[test]
    fn test_is_managed_dir() {
        let root = Path::new("/tmp");
        assert!(is_managed_dir(root, "dlgate_", Path::new("/tmp/dlgate_abc")));
        assert!(!is_managed_dir(root, "dlgate_", Path::new("/tmp/dlgate_")));
        assert!(!is_managed_dir(root, "dlgate_", Path::new("/tmp/other_abc")));
        assert!(!is_managed_dir(root, "dlgate_", Path::new("/var/dlgate_abc")));
        assert!(!is_managed_dir(root, "dlgate_", Path::new("/tmp/x/dlgate_abc")));
    }
}
