//! # Motor de Línea de Comandos
//! src/engine/command.rs
//!
//! Ejecuta un extractor externo (por defecto `yt-dlp`) como proceso hijo.
//!
//! ## Protocolo de salida
//!
//! La descarga corre con `--newline` y plantillas de progreso propias, así
//! que cada línea de stdout es una de:
//!
//! ```text
//! DLGATE_PROGRESS {"status":"downloading","downloaded_bytes":...}
//! DLGATE_POSTPROCESS {"status":"started","postprocessor":"Merger"}
//! DLGATE_FILE /tmp/dlgate_x/Title.mp4
//! ```
//!
//! Cualquier otra línea se ignora.

use crate::config::Config;
use crate::engine::formats::{self, RawInfo};
use crate::engine::{
    DownloadHooks, DownloadOutput, DownloadRequest, Engine, MediaInfo, PostProcessUpdate,
    ProgressUpdate,
};
use crate::error::EngineError;
use serde::Deserialize;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

const PROGRESS_TAG: &str = "DLGATE_PROGRESS ";
const POSTPROCESS_TAG: &str = "DLGATE_POSTPROCESS ";
const FILE_TAG: &str = "DLGATE_FILE ";

/// Reintentos internos del motor
pub const ENGINE_RETRIES: u32 = 3;

/// Motor basado en un proceso externo
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    socket_timeout: Duration,
    user_agent: String,
}

/// Una línea de stdout ya interpretada
#[derive(Debug, Clone, PartialEq)]
pub enum EngineLine {
    Progress(ProgressUpdate),
    PostProcess(PostProcessUpdate),
    FinalPath(PathBuf),
}

#[derive(Debug, Deserialize)]
struct RawProgress {
    status: String,
    downloaded_bytes: Option<f64>,
    total_bytes: Option<f64>,
    total_bytes_estimate: Option<f64>,
    speed: Option<f64>,
    eta: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPostProcess {
    status: String,
    #[serde(default)]
    postprocessor: String,
}

fn as_bytes(value: Option<f64>) -> Option<u64> {
    value.filter(|v| *v >= 0.0).map(|v| v as u64)
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, socket_timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            socket_timeout,
            user_agent: user_agent.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.engine_program.clone(),
            Duration::from_secs(config.engine_socket_timeout_secs),
            config.user_agent.clone(),
        )
    }

    /// Argumentos comunes a toda invocación
    fn common_args(&self) -> Vec<String> {
        vec![
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout.as_secs().max(1).to_string(),
            "--retries".to_string(),
            ENGINE_RETRIES.to_string(),
            "--user-agent".to_string(),
            self.user_agent.clone(),
            "--add-header".to_string(),
            "Accept:text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            "--add-header".to_string(),
            "Accept-Language:en-us,en;q=0.5".to_string(),
        ]
    }

    /// Argumentos de una descarga
    pub fn download_args(&self, request: &DownloadRequest, work_dir: &Path) -> Vec<String> {
        let mut args = self.common_args();

        args.push("--format".to_string());
        args.push(request.format_selector().to_string());

        if let Some(codec) = request.audio_codec() {
            args.extend([
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                codec.to_string(),
                "--audio-quality".to_string(),
                "192K".to_string(),
            ]);
        }
        if let Some(container) = request.merge_format() {
            args.push("--merge-output-format".to_string());
            args.push(container.to_string());
        }

        args.extend([
            "--output".to_string(),
            work_dir.join("%(title)s.%(ext)s").to_string_lossy().into_owned(),
            "--quiet".to_string(),
            "--progress".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            format!("download:{}%(progress)j", PROGRESS_TAG),
            "--progress-template".to_string(),
            format!("postprocess:{}%(progress)j", POSTPROCESS_TAG),
            "--print".to_string(),
            format!("after_move:{}%(filepath)s", FILE_TAG),
            "--".to_string(),
            request.url.clone(),
        ]);

        args
    }

    fn spawn_error(&self, err: io::Error) -> EngineError {
        if err.kind() == io::ErrorKind::NotFound {
            EngineError::permanent(format!("Engine program '{}' not found", self.program))
        } else {
            EngineError::from(err)
        }
    }

    /// Toma el mensaje más útil de stderr
    fn failure_from_stderr(stderr: &str, fallback: &str) -> EngineError {
        let line = stderr
            .lines()
            .rev()
            .find(|line| line.trim_start().starts_with("ERROR:"))
            .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
            .map(|line| line.trim().trim_start_matches("ERROR:").trim().to_string());

        EngineError::classify(line.unwrap_or_else(|| fallback.to_string()))
    }

    fn kill(child: &mut Child) {
        if let Err(e) = child.kill() {
            log::debug!("engine process already exited: {}", e);
        }
        let _ = child.wait();
    }
}

/// Interpreta una línea de stdout del motor
pub fn parse_line(line: &str) -> Option<EngineLine> {
    let line = line.trim_end();

    if let Some(payload) = line.strip_prefix(PROGRESS_TAG) {
        let raw: RawProgress = serde_json::from_str(payload).ok()?;
        return match raw.status.as_str() {
            "downloading" => Some(EngineLine::Progress(ProgressUpdate::Downloading {
                downloaded_bytes: as_bytes(raw.downloaded_bytes).unwrap_or(0),
                total_bytes: as_bytes(raw.total_bytes),
                total_bytes_estimate: as_bytes(raw.total_bytes_estimate),
                speed: raw.speed,
                eta: as_bytes(raw.eta),
            })),
            "finished" => Some(EngineLine::Progress(ProgressUpdate::Finished)),
            _ => None,
        };
    }

    if let Some(payload) = line.strip_prefix(POSTPROCESS_TAG) {
        let raw: RawPostProcess = serde_json::from_str(payload).ok()?;
        return match raw.status.as_str() {
            "started" => Some(EngineLine::PostProcess(PostProcessUpdate::Started {
                postprocessor: raw.postprocessor,
            })),
            "processing" => Some(EngineLine::PostProcess(PostProcessUpdate::Processing)),
            "finished" => Some(EngineLine::PostProcess(PostProcessUpdate::Finished)),
            _ => None,
        };
    }

    line.strip_prefix(FILE_TAG)
        .filter(|path| !path.is_empty())
        .map(|path| EngineLine::FinalPath(PathBuf::from(path)))
}

impl Engine for CommandEngine {
    fn extract_info(&self, url: &str) -> Result<MediaInfo, EngineError> {
        log::debug!("extracting info for {}", url);

        let output = Command::new(&self.program)
            .args(self.common_args())
            .arg("--dump-single-json")
            .arg("--")
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::failure_from_stderr(&stderr, "Could not extract video information"));
        }

        let raw: RawInfo = serde_json::from_slice(&output.stdout).map_err(|e| {
            EngineError::permanent(format!("Could not extract video information: {}", e))
        })?;

        Ok(formats::summarize(raw))
    }

    fn download(
        &self,
        request: &DownloadRequest,
        work_dir: &Path,
        hooks: &DownloadHooks,
    ) -> Result<DownloadOutput, EngineError> {
        let mut child = Command::new(&self.program)
            .args(self.download_args(request, work_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        log::debug!("engine process {} started for {}", child.id(), request.url);

        // stderr en su propio thread para que el pipe nunca se llene
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer);
                buffer
            })
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::transient("engine stdout unavailable"))?;

        let mut output = DownloadOutput::default();

        for line in BufReader::new(stdout).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    Self::kill(&mut child);
                    return Err(EngineError::from(e));
                }
            };

            let step = match parse_line(&line) {
                Some(EngineLine::Progress(update)) => hooks.progress(&update),
                Some(EngineLine::PostProcess(update)) => hooks.post_process(&update),
                Some(EngineLine::FinalPath(path)) => {
                    output.file_path = Some(path);
                    Ok(())
                }
                None => Ok(()),
            };

            if let Err(e) = step {
                log::info!("stopping engine process {}: {}", child.id(), e);
                Self::kill(&mut child);
                return Err(e);
            }
        }

        let status = child.wait().map_err(EngineError::from)?;
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if hooks.is_cancelled() {
            return Err(EngineError::cancelled());
        }

        if !status.success() {
            return Err(Self::failure_from_stderr(&stderr, "Download failed"));
        }

        Ok(output)
    }
}
