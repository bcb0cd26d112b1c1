//! Utilidades compartidas por los tests de integración
//! tests/common/mod.rs
//!
//! `ScriptedEngine` reemplaza al extractor real con un guion fijo.

#![allow(dead_code)]

use download_gate::config::Config;
use download_gate::engine::{
    DownloadHooks, DownloadOutput, DownloadRequest, Engine, MediaFormat, MediaInfo,
    PostProcessUpdate, ProgressUpdate,
};
use download_gate::error::EngineError;
use download_gate::service::DownloadService;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const PREFIX: &str = "dlgate_";

/// Compuerta de un solo uso para liberar trabajos bloqueados
#[derive(Clone, Default)]
pub struct Latch(Arc<(Mutex<bool>, Condvar)>);

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (lock, condvar) = &*self.0;
        *lock.lock().unwrap() = true;
        condvar.notify_all();
    }

    pub fn wait(&self) {
        let (lock, condvar) = &*self.0;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = condvar.wait(open).unwrap();
        }
    }
}

/// Comportamiento del motor
#[derive(Clone)]
pub enum Script {
    /// Reporta `steps` progresos cada `delay` y escribe `bytes` bytes
    Succeed { steps: usize, delay: Duration, bytes: usize },

    /// Falla enseguida
    Fail(EngineError),

    /// Bloquea hasta que se abra el latch, sin mirar los hooks
    Block(Latch),

    /// Duerme sin llamar a los hooks y luego escribe el archivo
    IgnoreCancel(Duration),

    /// Reporta progreso en loop hasta que un hook falle
    HonorCancel,
}

pub struct ScriptedEngine {
    script: Script,
    pub calls: AtomicUsize,
    pub saw_cancel: AtomicBool,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            saw_cancel: AtomicBool::new(false),
        })
    }

    pub fn quick() -> Arc<Self> {
        Self::new(Script::Succeed {
            steps: 3,
            delay: Duration::from_millis(5),
            bytes: 64,
        })
    }

    fn write_output(dir: &Path, bytes: usize) -> Result<DownloadOutput, EngineError> {
        let path = dir.join("Sample Clip.mp4");
        fs::write(&path, vec![7u8; bytes]).map_err(EngineError::from)?;
        Ok(DownloadOutput { file_path: Some(path) })
    }

    fn downloading(done: usize, total: usize) -> ProgressUpdate {
        ProgressUpdate::Downloading {
            downloaded_bytes: done as u64,
            total_bytes: Some(total as u64),
            total_bytes_estimate: None,
            speed: Some(1024.0),
            eta: Some(1),
        }
    }
}

pub fn sample_info() -> MediaInfo {
    MediaInfo {
        title: "Sample Clip".to_string(),
        thumbnail: None,
        duration: Some(12.0),
        uploader: Some("tester".to_string()),
        video_formats: vec![MediaFormat {
            format_id: "bestvideo[height<=720]+bestaudio/best[height<=720]".to_string(),
            ext: "mp4".to_string(),
            resolution: Some("720p".to_string()),
            filesize: None,
            has_audio: true,
            has_video: true,
            quality_label: Some("720p (MP4)".to_string()),
        }],
        audio_formats: Vec::new(),
    }
}

impl Engine for ScriptedEngine {
    fn extract_info(&self, _url: &str) -> Result<MediaInfo, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.script {
            Script::Fail(e) => Err(e.clone()),
            Script::Block(latch) => {
                latch.wait();
                Ok(sample_info())
            }
            Script::IgnoreCancel(delay) => {
                thread::sleep(*delay);
                Ok(sample_info())
            }
            Script::Succeed { .. } | Script::HonorCancel => Ok(sample_info()),
        }
    }

    fn download(
        &self,
        _request: &DownloadRequest,
        work_dir: &Path,
        hooks: &DownloadHooks,
    ) -> Result<DownloadOutput, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.script {
            Script::Succeed { steps, delay, bytes } => {
                for step in 1..=*steps {
                    hooks.progress(&Self::downloading(step, *steps))?;
                    thread::sleep(*delay);
                }
                hooks.progress(&ProgressUpdate::Finished)?;
                hooks.post_process(&PostProcessUpdate::Started {
                    postprocessor: "Merger".to_string(),
                })?;
                Self::write_output(work_dir, *bytes)
            }
            Script::Fail(e) => Err(e.clone()),
            Script::Block(latch) => {
                latch.wait();
                Self::write_output(work_dir, 16)
            }
            Script::IgnoreCancel(delay) => {
                thread::sleep(*delay);
                Self::write_output(work_dir, 16)
            }
            Script::HonorCancel => loop {
                if let Err(e) = hooks.progress(&Self::downloading(1, 100)) {
                    self.saw_cancel.store(true, Ordering::SeqCst);
                    return Err(e);
                }
                thread::sleep(Duration::from_millis(10));
            },
        }
    }
}

/// Configuración rápida con raíz temporal propia
pub fn test_config(root: &Path) -> Config {
    Config {
        temp_root: Some(root.to_path_buf()),
        max_concurrent_ops: 2,
        worker_threads: 4,
        admission_wait_ms: 20,
        poll_interval_ms: 20,
        cancel_grace_ms: 500,
        sweep_period_secs: 3600,
        sweeper_join_ms: 2_000,
        metrics_enabled: false,
        ..Config::default()
    }
}

pub fn start_service(config: Config, engine: Arc<ScriptedEngine>) -> DownloadService {
    download_gate::logging::init_for_tests();
    DownloadService::start(config, engine).expect("service should start")
}

/// Directorios de trabajo presentes bajo `root`
pub fn work_dirs(root: &Path) -> Vec<PathBuf> {
    match fs::read_dir(root) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_dir()
                    && path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .map(|name| name.starts_with(PREFIX))
                        .unwrap_or(false)
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Espera hasta que `condition` sea verdadera o venza `timeout`
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
