use std::sync::Arc;

use aefne_desk::api::HttpProjectService;
use aefne_desk::app::App;
use aefne_desk::config::ClientConfig;
use aefne_desk::session::SessionController;
use aefne_desk::surface::TerminalSurface;
use anyhow::Context;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("Invalid configuration")?;

    // Initialize tracing. With a log dir, keep logs out of the terminal UI.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_dir = config
        .prepare_log_dir()
        .context("Could not create the log directory")?;
    let _guard = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "aefne-desk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    };

    let user_id = config
        .user_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let service = Arc::new(HttpProjectService::new(&config));

    eprintln!("AEFNE desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Service: {}", service.base_url());
    eprintln!("   User: {}", user_id);
    eprintln!("   Type /help for commands, /quit to exit.\n");

    tracing::info!(base_url = %service.base_url(), user_id = %user_id, "Starting session");

    let controller = SessionController::new(service, user_id);
    let mut app = App::new(controller, TerminalSurface::stdio());
    app.run().await?;

    tracing::info!("Session ended");
    Ok(())
}
