use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_PATH_ENV: &str = "ARENA_LOG";

/// Sends tracing output to the file named by `ARENA_LOG`.
///
/// The terminal belongs to the UI, so nothing is logged unless that variable
/// is set. `RUST_LOG` picks the filter and defaults to `info`.
pub fn init() {
    let Some(path) = std::env::var_os(LOG_PATH_ENV).filter(|path| !path.is_empty()) else {
        return;
    };

    let file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Warning: failed to open log file {}: {err}", path.to_string_lossy());
            return;
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init();
}
