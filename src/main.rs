use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use local_pdf_qa::{Config, QaEngine};

fn get_log_dir() -> String {
    std::env::var("LOG_DIR").unwrap_or_else(|_| {
        if std::path::Path::new("/var/log").exists() && is_writable("/var/log") {
            "/var/log/local-pdf-qa".to_string()
        } else {
            "./logs".to_string()
        }
    })
}

fn get_log_level() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

fn get_log_max_mb() -> u64 {
    std::env::var("LOG_MAX_MB")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5)
}

fn is_writable(path: &str) -> bool {
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(format!("{}/test_write", path))
        .map(|_| {
            let _ = std::fs::remove_file(format!("{}/test_write", path));
            true
        })
        .unwrap_or(false)
}

fn setup_logging() -> Result<()> {
    let log_dir = get_log_dir();
    let log_level = get_log_level();

    std::fs::create_dir_all(&log_dir)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    let is_development = std::env::var("DEVELOPMENT").is_ok() || std::env::var("DEV").is_ok();
    let force_console = std::env::var("CONSOLE_LOGS").is_ok();

    if is_development || force_console {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
        tracing::info!("Development mode: logging to stderr");
    } else {
        let log_file = format!("{}/local-pdf-qa.log", log_dir);
        let file_appender = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(file_appender)
            .json()
            .init();
    }

    tracing::info!("Logging initialized");
    tracing::info!("Log directory: {}", log_dir);
    tracing::info!("Log level: {}", log_level);

    Ok(())
}

async fn start_log_cleanup_task(log_dir: String, max_mb: u64) {
    let max_bytes = max_mb * 1024 * 1024;
    let log_file = format!("{}/local-pdf-qa.log", log_dir);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Ok(metadata) = std::fs::metadata(&log_file) {
                if metadata.len() > max_bytes {
                    if let Err(e) = std::fs::write(
                        &log_file,
                        format!("[LOG TRUNCATED - Size exceeded {}MB]\n", max_mb),
                    ) {
                        eprintln!("Failed to truncate log file: {}", e);
                    }
                }
            }
        }
    });
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    Ask { question: String },
    Reindex,
    Health,
}

/// Newline-delimited JSON command loop over stdin/stdout.
async fn serve(engine: QaEngine) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Command>(line) {
            Ok(Command::Ask { question }) => serde_json::to_value(engine.ask(&question).await)?,
            Ok(Command::Reindex) => serde_json::to_value(engine.reindex().await)?,
            Ok(Command::Health) => serde_json::to_value(engine.health().await)?,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable command line");
                json!({ "error": format!("gecersiz komut: {e}") })
            }
        };

        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        stdout.write_all(&payload).await?;
        stdout.flush().await?;
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }
    setup_logging()?;

    let log_dir = get_log_dir();
    let log_max_mb = get_log_max_mb();
    start_log_cleanup_task(log_dir, log_max_mb).await;

    let config = Config::from_env();
    tracing::info!("Documents directory: {}", config.docs_dir.display());
    tracing::info!("Index TTL: {}s", config.index_ttl.as_secs());

    let engine = QaEngine::new(config);

    let warmup = engine.clone();
    tokio::spawn(async move {
        tracing::info!("Starting initial index build in background...");
        match warmup.rebuild().await {
            Ok(true) => tracing::info!("Initial index build completed"),
            Ok(false) => tracing::info!("Initial index build already running"),
            Err(e) => tracing::error!("Initial index build failed: {}", e),
        }
    });

    tracing::info!("Serving commands on stdin/stdout");
    serve(engine).await
}
