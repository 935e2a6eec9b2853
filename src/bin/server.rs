//! moodsync reference server
//!
//! Stores mood entries for the `mood` CLI and any other client speaking the
//! same HTTP binding.
//!
//! # Configuration
//!
//! Environment variables:
//! - `MOODSYNC_PORT`: Port to listen on (default: 8080)
//! - `MOODSYNC_DATA_DIR`: Directory holding `moods.db` (default: ~/.local/share/moodsync-server)
//! - `MOODSYNC_CONFIG`: Path to config file (default: ~/.config/moodsync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `PUT /moods/{id}`: Insert or replace an entry (auth required)
//! - `GET /moods/today?user_id=..&date=YYYY-MM-DD`: Latest entry for the day (auth required)

use moodsync::server::{router, ApiKeyStore, AppState, MoodStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    port: u16,
    data_dir: PathBuf,
    config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("MOODSYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("MOODSYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("moodsync-server")
            });

        let config_path = std::env::var("MOODSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("moodsync-server")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodsync_server=info,moodsync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(Config::from_env()).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let store = MoodStore::open(&config.data_dir.join("moods.db")).await?;
    let api_keys = ApiKeyStore::load(&config.config_path);

    let app = router(AppState::new(api_keys, store));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
