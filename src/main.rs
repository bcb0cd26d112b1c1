//! # Download Gate - Entry Point
//! src/main.rs
//!
//! CLI que maneja el servicio de punta a punta:
//!
//! ```bash
//! download_gate info URL
//! download_gate download URL --audio -o ./out
//! download_gate stream URL --save ./out
//! ```

use clap::{Parser, Subcommand};
use download_gate::config::Config;
use download_gate::engine::{CommandEngine, DownloadRequest};
use download_gate::error::Disposition;
use download_gate::logging;
use download_gate::service::{DownloadService, FileDownload};
use download_gate::stream::ProgressEvent;
use download_gate::transport::SseStream;
use download_gate::GateError;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "download_gate", version, about = "Admisión, timeouts y limpieza para descargas con un motor externo")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Muestra metadatos y formatos
    Info { url: String },

    /// Descarga completa sin progreso
    Download {
        url: String,

        #[arg(long, default_value = "best")]
        format: String,

        #[arg(long)]
        audio: bool,

        /// Directorio destino
        #[arg(short = 'o', long = "output", default_value = ".")]
        output: PathBuf,
    },

    /// Descarga con progreso en formato SSE por stdout
    Stream {
        url: String,

        #[arg(long, default_value = "best")]
        format: String,

        #[arg(long)]
        audio: bool,

        /// Reclamar el archivo al terminar y guardarlo en este directorio
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Imprime el reporte de salud
    Health,
}

fn request_for(url: String, format: String, audio: bool) -> DownloadRequest {
    DownloadRequest {
        audio_only: audio,
        ..DownloadRequest::new(url).with_format(format)
    }
}

fn save(download: FileDownload, dir: &Path) -> Result<PathBuf, GateError> {
    let target = dir.join(download.filename());
    let mut file = File::create(&target)?;
    let mut stream = download.into_stream();
    io::copy(&mut stream, &mut file)?;
    Ok(target)
}

fn run(service: &DownloadService, command: Command) -> Result<(), GateError> {
    match command {
        Command::Info { url } => {
            let info = service.fetch_info(&url)?;
            let json = serde_json::to_string_pretty(&info)
                .map_err(|e| GateError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
            println!("{}", json);
        }

        Command::Download { url, format, audio, output } => {
            let download = service.download(request_for(url, format, audio))?;
            println!("📦 {} ({} bytes, {})", download.filename(), download.file_size(), download.content_type());
            let path = save(download, &output)?;
            println!("✅ guardado en {}", path.display());
        }

        Command::Stream { url, format, audio, save: target } => {
            let stream = service.stream_download(request_for(url, format, audio))?;
            let mut sse = SseStream::new(stream);
            let last = sse.pump(&mut io::stdout().lock())?;
            drop(sse);

            if let (Some(ProgressEvent::Complete { id, .. }), Some(dir)) = (last, target) {
                match service.open_download(id.as_str())? {
                    Some(download) => {
                        let path = save(download, &dir)?;
                        eprintln!("✅ guardado en {}", path.display());
                    }
                    None => eprintln!("⚠️  la descarga expiró antes de reclamarla"),
                }
            }
        }

        Command::Health => {
            println!("{}", service.health().to_json());
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(logging::parse_level(&cli.config.log_level)) {
        eprintln!("logger already initialized: {}", e);
    }
    cli.config.log_summary();

    let engine = Arc::new(CommandEngine::from_config(&cli.config));
    let service = match DownloadService::start(cli.config, engine) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("💥 Error fatal: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&service, cli.command);
    service.shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.disposition() {
                Disposition::RetryLater | Disposition::RetryLaterMayBeRunning => {
                    eprintln!("⏳ {} (reintentar más tarde)", e)
                }
                _ => eprintln!("❌ {}", e),
            }
            ExitCode::FAILURE
        }
    }
}
