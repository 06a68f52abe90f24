/// flowedit: flow-version mutation pipeline for a visual workflow editor
///
/// Main entry point for the flowedit server. Initializes configuration and
/// starts the local HTTP API.

use flowedit::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Editor session API at /api/session*
/// - Realtime push at /realtime/events
/// - Health check at /healthz
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (defaults to 127.0.0.1:3005 and a local backend)
    let config = Config::default();

    start_server(config).await
}
