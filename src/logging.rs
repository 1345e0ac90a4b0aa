// Logging setup for connect-bridge
// Logs go to stderr (stdout belongs to the host bridge); --debug mirrors them to a file

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

pub const DEBUG_LOG_PATH: &str = "/tmp/connect-bridge-debug.log";

/// Install the global subscriber
///
/// `RUST_LOG` wins over `level`. With `debug` set, the default level drops to
/// `debug` and every line is also appended to [`DEBUG_LOG_PATH`].
pub fn init(level: &str, debug: bool) -> anyhow::Result<()> {
    let filter = build_filter(level, debug);

    let installed = if debug {
        let file = open_debug_log(Path::new(DEBUG_LOG_PATH))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(io::stderr.and(Arc::new(file)))
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init()
    };

    installed.map_err(|e| anyhow::anyhow!("installing log subscriber: {}", e))
}

/// Subscriber for the short window before the config is known
pub fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter("info", false))
        .with_writer(io::stderr)
        .finish()
}

fn build_filter(level: &str, debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug { "debug" } else { level })
    })
}

/// Create/truncate the debug log and write the session header
pub fn open_debug_log(path: &Path) -> io::Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    writeln!(file, "=== connect-bridge Debug Log ===")?;
    writeln!(file, "Session started: {:?}", SystemTime::now())?;
    writeln!(file, "To monitor: tail -f {}", path.display())?;
    writeln!(file, "========================================\n")?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_log_header_truncates() {
        let path = std::env::temp_dir().join(format!("connect-bridge-log-{}.log", std::process::id()));
        std::fs::write(&path, "stale contents\n").unwrap();

        drop(open_debug_log(&path).unwrap());
        let contents = std::fs::read_to_string(&path).unwrap();

        assert!(contents.starts_with("=== connect-bridge Debug Log ==="));
        assert!(contents.contains("tail -f"));
        assert!(!contents.contains("stale contents"));
        std::fs::remove_file(&path).unwrap();
    }
}
