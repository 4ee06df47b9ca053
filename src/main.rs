use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use taskflow_api_rust::app::{router, AppState};
use taskflow_api_rust::auth::{generate_jwt, Claims};
use taskflow_api_rust::clock::SystemClock;
use taskflow_api_rust::config::{AppConfig, StoreBackend};
use taskflow_api_rust::database::{DatabaseManager, DocumentStore, MemoryStore, PgDocumentStore};
use taskflow_api_rust::functions::default_registry;
use taskflow_api_rust::is_production;
use taskflow_api_rust::middleware::parse_trusted_proxies;
use taskflow_api_rust::security::{SecurityDeps, SecurityLogger};

#[derive(Parser)]
#[command(name = "taskflow-api")]
#[command(about = "Taskflow API - secured function backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to listen on, overrides TASKFLOW_API_PORT")]
        port: Option<u16>,
        #[arg(long, help = "Document store backend: postgres or memory")]
        backend: Option<StoreBackend>,
    },

    #[command(about = "Print a signed bearer token for local testing")]
    Token {
        uid: String,
        #[arg(long)]
        email: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = taskflow_api_rust::config::config().clone();

    if config.security.jwt_secret.is_empty() {
        if is_production!() {
            bail!("JWT_SECRET must be set in production");
        }
        tracing::warn!("JWT_SECRET not set, using an insecure development secret");
        config.security.jwt_secret = "taskflow-dev-secret".to_string();
    }

    match cli.command.unwrap_or(Commands::Serve { port: None, backend: None }) {
        Commands::Serve { port, backend } => {
            if let Some(port) = port {
                config.api.port = port;
            }
            if let Some(backend) = backend {
                config.database.backend = backend;
            }
            serve(config).await
        }
        Commands::Token { uid, email } => {
            let claims = Claims::new(uid, email, config.security.jwt_expiry_hours);
            println!("{}", generate_jwt(&claims, &config.security.jwt_secret)?);
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Taskflow API in {:?} mode", config.environment);

    let store: Arc<dyn DocumentStore> = match config.database.backend {
        StoreBackend::Postgres => {
            let pool = DatabaseManager::connect(&config.database)
                .await
                .context("failed to connect to Postgres")?;
            DatabaseManager::migrate(&pool).await.context("failed to prepare document table")?;
            Arc::new(PgDocumentStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let logger = SecurityLogger::new(store.clone()).with_persistence(config.security.enable_audit_logging);
    let deps = SecurityDeps::with_logger(store.clone(), Arc::new(SystemClock), logger.clone());
    let registry = default_registry(&config, store.clone(), &deps).context("invalid function policy")?;

    let state = AppState {
        registry: Arc::new(registry),
        store,
        logger,
        jwt_secret: config.security.jwt_secret.clone(),
        trusted_proxies: parse_trusted_proxies(&config.api.trusted_proxies).into(),
    };
    let app = router(state, &config);

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Taskflow API listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")
}
