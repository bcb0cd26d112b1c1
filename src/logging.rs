//! # Logging
//! src/logging.rs
//!
//! Inicializa el logger global (`log` + `simplelog`).
//! El resto del crate solo usa las macros de `log`.

use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

/// Instala un logger de terminal con el nivel indicado
///
/// Retorna error si ya había un logger instalado.
pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )])
}

/// Logger para tests: no hace nada si otro test ya lo instaló
pub fn init_for_tests() {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = init(level);
}

/// Traduce `RUST_LOG`-style (`info`, `debug`...) a un `LevelFilter`
pub fn parse_level(value: &str) -> LevelFilter {
    value.parse().unwrap_or(LevelFilter::Info)
}
