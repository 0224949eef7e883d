use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stroll_history::config::Config;
use stroll_history::rpc::Dispatcher;
use stroll_history::ServiceState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => fatal("config", &e),
    };

    // stdout carries the protocol; every diagnostic goes to stderr
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    let _guard = if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("stroll-history.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        Some(guard)
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        None
    };

    tracing::info!("stroll-history starting (data root: {})", config.data.root);

    let state = ServiceState::new(config);
    state.startup().await;

    let dispatcher = Dispatcher::new(state);
    if let Err(e) = dispatcher.run(tokio::io::stdin(), tokio::io::stdout()).await {
        fatal("transport", &e);
    }

    tracing::info!("stdin closed; shutting down");
}

/// Emit one JSON diagnostic on stderr and exit non-zero
fn fatal(stage: &str, err: &anyhow::Error) -> ! {
    eprintln!(
        "{}",
        serde_json::json!({
            "fatal": true,
            "stage": stage,
            "error": err.to_string(),
        })
    );
    std::process::exit(1);
}
