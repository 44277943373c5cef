use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use photo_portal::configuration::get_configuration;
use photo_portal::startup::{run, AppStores};
use photo_portal::store::{PgSessionStore, PgUserStore};
use photo_portal::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();
    // The request logger emits through the log facade; give it a backend.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    tracing::info!("Starting photo-portal");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    // Bounded acquisition: when the database is unreachable, store calls
    // fail as unavailable instead of hanging requests.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(
            configuration.database.acquire_timeout_seconds,
        ))
        .connect_lazy(&configuration.database.connection_string())
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    let stores = AppStores {
        users: Arc::new(PgUserStore::new(pool.clone())),
        sessions: Arc::new(PgSessionStore::new(pool)),
    };

    let address = format!("127.0.0.1:{}", configuration.application.port);
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, stores, configuration.jwt)?;
    server.await
}
