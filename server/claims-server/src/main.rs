use std::net::SocketAddr;

use clap::Parser;
use claims_server::{create_app, AppConfig, AppState, Backends};
use error_common::{log_error, PlatformError};
use insurance_service::run_periodically;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use workflow_engine::{automation_queue, run_automation_worker, DEFAULT_QUEUE_CAPACITY};

#[derive(Parser, Debug)]
#[command(name = "claims-server")]
#[command(about = "SHA claims engine HTTP server")]
struct Args {
    /// Host to bind to (overrides server.host)
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to bind to (overrides server.port)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "claims_server={level},claims_service={level},insurance_service={level},workflow_engine={level},tower_http=info,sqlx=warn"
        ))
    });

    let development = std::env::var("CLAIMS_ENV").is_ok_and(|env| env == "development");
    let registry = tracing_subscriber::registry().with(env_filter);
    if development {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(true)
                    .with_timer(fmt::time::ChronoUtc::rfc_3339()),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(err) = run(args).await {
        log_error("claims-server", &err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), PlatformError> {
    info!("Starting SHA claims server v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(args.config.as_deref())?;
    let backends = Backends::connect(&config).await?;
    info!("Database ready");

    let (queue, receiver) = automation_queue(DEFAULT_QUEUE_CAPACITY);
    let state = AppState::new(&config, backends, Some(queue));

    tokio::spawn(run_automation_worker(state.workflows.clone(), receiver));
    if config.reconciliation.enabled {
        info!(
            interval_secs = config.reconciliation.interval_secs,
            "Reconciliation timer started"
        );
        tokio::spawn(run_periodically(
            state.reconciler.clone(),
            config.reconciliation_interval(),
        ));
    }

    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| PlatformError::ConfigError(format!("Invalid bind address {host}:{port}: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PlatformError::NetworkError(format!("Failed to bind {addr}: {e}")))?;
    info!("Server listening on http://{addr}");

    axum::serve(listener, create_app(state))
        .await
        .map_err(|e| PlatformError::ServerError(e.to_string()))
}
