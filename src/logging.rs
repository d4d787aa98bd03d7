use std::any::Any;
use std::path::{Path, PathBuf};

pub const LOG_FILE_BASENAME: &str = "focusring";
pub const LOG_FILE_SUFFIX: &str = "log";
pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_ROTATE_KEEP_FILES: usize = 10;
pub const LOG_ENV_VAR: &str = "FOCUSRING_LOG";
const LOG_SUBDIR: &str = "logs";

/// Everything the file logger needs, resolved from the app data dir and the
/// environment before any logger exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub directory: PathBuf,
    pub spec: String,
    pub rotate_size_bytes: u64,
    pub keep_files: usize,
    /// Mirror records to stdout (debug builds).
    pub echo_stdout: bool,
}

impl LogConfig {
    pub fn resolve(app_data_dir: &Path, app_var: Option<String>, rust_log: Option<String>) -> Self {
        Self {
            directory: log_directory(app_data_dir),
            spec: log_spec(app_var, rust_log),
            rotate_size_bytes: LOG_ROTATE_SIZE_BYTES,
            keep_files: LOG_ROTATE_KEEP_FILES,
            echo_stdout: cfg!(debug_assertions),
        }
    }

    pub fn from_env(app_data_dir: &Path) -> Self {
        Self::resolve(
            app_data_dir,
            std::env::var(LOG_ENV_VAR).ok(),
            std::env::var("RUST_LOG").ok(),
        )
    }

    pub fn current_file(&self) -> PathBuf {
        self.directory
            .join(format!("{LOG_FILE_BASENAME}_rCURRENT.{LOG_FILE_SUFFIX}"))
    }
}

/// `logs/` under the app data dir, away from the JSON documents.
pub fn log_directory(app_data_dir: &Path) -> PathBuf {
    app_data_dir.join(LOG_SUBDIR)
}

/// First non-blank value of `FOCUSRING_LOG`, then `RUST_LOG`, else the build default.
pub fn log_spec(app_var: Option<String>, rust_log: Option<String>) -> String {
    let default_spec = if cfg!(debug_assertions) {
        "warn,focusring_lib=debug"
    } else {
        "warn,focusring_lib=info"
    };
    [app_var, rust_log]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| default_spec.to_string())
}

pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(all(feature = "app", not(test)))]
pub fn init_logging(app_data_dir: &Path) -> Result<LogConfig, flexi_logger::FlexiLoggerError> {
    use flexi_logger::{
        detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming, WriteMode,
    };

    let config = LogConfig::from_env(app_data_dir);
    std::fs::create_dir_all(&config.directory)?;

    let echo = if config.echo_stdout {
        Duplicate::Info
    } else {
        Duplicate::None
    };
    Logger::try_with_str(&config.spec)?
        .log_to_file(
            FileSpec::default()
                .directory(&config.directory)
                .basename(LOG_FILE_BASENAME)
                .suffix(LOG_FILE_SUFFIX),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(config.rotate_size_bytes),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.keep_files),
        )
        .duplicate_to_stdout(echo)
        .start()?;

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<unknown>".to_string());
        log::error!(
            "panic message={} location={location}\n{}",
            panic_message(info.payload()),
            std::backtrace::Backtrace::force_capture()
        );
        previous_hook(info);
    }));

    log::info!(
        "logging to {} spec={} rotate_size_bytes={} keep_files={}",
        config.current_file().display(),
        config.spec,
        config.rotate_size_bytes,
        config.keep_files
    );
    Ok(config)
}
