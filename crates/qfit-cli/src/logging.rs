use crate::error::{CliError, Result};
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self},
    prelude::*,
};

fn console_level(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::ERROR
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

/// The log file always records the run at INFO or finer.
fn file_level(console: LevelFilter) -> LevelFilter {
    console.max(LevelFilter::INFO)
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: &Path) -> Result<()> {
    let console = console_level(verbosity, quiet);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(console);

    let file = File::create(log_file).map_err(CliError::Io)?;
    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true)
        .with_filter(file_level(console));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install the logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Once;
    use std::thread;
    use std::time::Duration;
    use tracing::{debug, error, info, trace, warn};

    static INIT: Once = Once::new();

    fn ensure_global_logger_is_set() {
        INIT.call_once(|| {
            let dir = tempfile::tempdir().unwrap();
            setup_logging(3, false, &dir.path().join("global.log"))
                .expect("Failed to set up global logger for tests");
        });
    }

    #[test]
    #[serial]
    fn initialization_and_macros_work() {
        ensure_global_logger_is_set();

        error!("This is an error");
        warn!("This is a warning");
        info!("This is info");
        debug!("This is debug");
        trace!("This is trace");
    }

    #[test]
    fn levels_follow_verbosity() {
        assert_eq!(console_level(0, false), LevelFilter::WARN);
        assert_eq!(console_level(1, false), LevelFilter::INFO);
        assert_eq!(console_level(2, false), LevelFilter::DEBUG);
        assert_eq!(console_level(7, false), LevelFilter::TRACE);
        assert_eq!(console_level(2, true), LevelFilter::ERROR);

        assert_eq!(file_level(LevelFilter::WARN), LevelFilter::INFO);
        assert_eq!(file_level(LevelFilter::ERROR), LevelFilter::INFO);
        assert_eq!(file_level(LevelFilter::TRACE), LevelFilter::TRACE);
    }

    #[test]
    #[serial]
    fn file_layer_records_info_even_when_console_is_quiet() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("qfit_ligand.log");

        let file = File::create(&log_path).unwrap();
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_filter(file_level(console_level(0, true)));
        let subscriber = tracing_subscriber::registry().with(file_layer);

        tracing::subscriber::with_default(subscriber, || {
            info!("qfit-ligand map.ccp4 1.5 ligand.pdb");
            debug!("Not recorded at this level.");
        });

        thread::sleep(Duration::from_millis(100));

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("qfit-ligand map.ccp4 1.5 ligand.pdb"));
        assert!(content.contains("INFO"));
        assert!(content.contains("ThreadId"));
        assert!(!content.contains("Not recorded"));
    }

    #[test]
    #[serial]
    fn invalid_log_file_path_propagates_error() {
        let invalid_path = Path::new("/");

        if cfg!(unix) && invalid_path.is_dir() {
            let result = setup_logging(0, false, invalid_path);
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}
