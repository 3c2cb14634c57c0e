use anyhow::Context as _;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Appends log lines to this file instead of stderr when set.
pub const LOG_FILE_ENV: &str = "BOOKCATALOG_LOG_FILE";

const DEFAULT_FILTER: &str = "info,chromiumoxide=warn";

pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_FILTER))
        .context("build log filter")?;

    let (writer, ansi) = match std::env::var_os(LOG_FILE_ENV).filter(|path| !path.is_empty()) {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open log file: {}", path.to_string_lossy()))?;
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(writer)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
