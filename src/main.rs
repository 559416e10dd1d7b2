//! MedSAS - multi-tenant account, entitlement and ledger backend
//!
//! Serves the JSON API under `/api` and, optionally, a prebuilt single-page
//! frontend from a static directory.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{http::HeaderValue, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use config::{LogFormat, LogTarget};
use medsas::{
    api, config, db,
    middleware::with_security_headers,
    services::{build_mailer, start_lifecycle_scheduler, AuthService, LifecycleSweeper},
    AppConfig, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("MedSAS {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guard must be kept alive for the duration of the program
    // to ensure log messages are flushed to files
    let _log_guard = init_logging(&config);

    info!("MedSAS starting up");

    ensure_data_directory(&config)?;

    info!("Initializing database connection");
    let db = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;

    if args.iter().any(|arg| arg == "--migrate-only") {
        info!("Migrations applied, exiting (--migrate-only)");
        return Ok(());
    }

    bootstrap_super_admin(&config, &db).await?;

    let mailer = build_mailer(&config.email).context("Failed to initialize mailer")?;
    let state = AppState::new(config.clone(), db, mailer);

    let _sweep_scheduler = if config.trial.sweep_interval_secs > 0 {
        info!("Starting lifecycle sweep scheduler");
        Some(start_lifecycle_scheduler(
            LifecycleSweeper::new(
                state.db.clone(),
                config.trial.appeal_window_days,
                Some(state.email()),
            ),
            Duration::from_secs(config.trial.sweep_interval_secs),
        ))
    } else {
        info!("In-process lifecycle sweep disabled");
        None
    };

    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;

    info!("Starting HTTP server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server error")?;

    Ok(())
}

/// Create the configured super admin on first start
async fn bootstrap_super_admin(config: &AppConfig, db: &db::DbPool) -> Result<()> {
    let (Some(email), Some(password)) = (
        config.bootstrap.super_admin_email.as_deref(),
        config.bootstrap.super_admin_password.as_deref(),
    ) else {
        return Ok(());
    };

    match AuthService::new(db.clone())
        .ensure_super_admin(email, password)
        .await?
    {
        Some(id) => info!(user_id = %id, "Created super admin {}", email),
        None => info!("Super admin already present, bootstrap skipped"),
    }
    Ok(())
}

/// Initialize the logging/tracing infrastructure
fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let log_config = &config.logging;
    let (file_writer, guard) = match log_config.target {
        LogTarget::Console => (None, None),
        LogTarget::File | LogTarget::Both => {
            let (writer, guard) = create_file_writer(log_config);
            (Some(writer), Some(guard))
        }
    };
    let to_console = log_config.target != LogTarget::File;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(to_console.then(|| format_layer(&log_config.format, std::io::stdout)))
        .with(file_writer.map(|writer| format_layer(&log_config.format, writer)))
        .init();

    guard
}

/// One fmt layer in the configured format
fn format_layer<S, W>(
    format: &LogFormat,
    writer: W,
) -> Box<dyn tracing_subscriber::Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    use tracing_subscriber::{fmt, Layer};

    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(writer)
            .boxed(),
    }
}

/// Create a file writer with optional daily rotation
fn create_file_writer(
    log_config: &config::LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let rotation = if log_config.daily_rotation {
        tracing_appender::rolling::Rotation::DAILY
    } else {
        tracing_appender::rolling::Rotation::NEVER
    };

    let mut builder = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&log_config.log_prefix);
    if log_config.max_log_files > 0 {
        builder = builder.max_log_files(log_config.max_log_files);
    }

    match builder.build(&log_config.log_dir) {
        Ok(appender) => tracing_appender::non_blocking(appender),
        Err(e) => {
            eprintln!("Warning: Failed to open log file, logging to stderr: {}", e);
            tracing_appender::non_blocking(std::io::stderr())
        }
    }
}

/// Ensure the data directory exists
fn ensure_data_directory(config: &AppConfig) -> Result<()> {
    if let Some(path) = config.database.url.strip_prefix("sqlite://") {
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
                info!("Created data directory: {:?}", parent);
            }
        }
    }
    Ok(())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Create the application router with all routes and middleware
fn create_router(state: AppState, config: &AppConfig) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let api_router = api::router(state);

    let router = match config.server.static_dir {
        Some(ref static_dir) if static_dir.exists() => {
            info!("Serving frontend from {:?}", static_dir);
            let index_file = static_dir.join("index.html");
            if index_file.exists() {
                api_router.fallback_service(
                    ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file)),
                )
            } else {
                warn!("index.html not found in {:?}, SPA fallback disabled", static_dir);
                api_router.fallback_service(ServeDir::new(static_dir))
            }
        }
        Some(ref static_dir) => {
            warn!("Static directory {:?} does not exist, frontend not served", static_dir);
            api_router
        }
        None => api_router,
    };

    with_security_headers(router, config.server.hsts)
        .layer(CompressionLayer::new())
        .layer(trace_layer)
        .layer(cors_layer(config))
}

/// Print help message
fn print_help() {
    println!(
        r#"MedSAS {}

USAGE:
    medsas [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --migrate-only          Apply database migrations and exit

ENVIRONMENT:
    MEDSAS_CONFIG       Path to configuration file (default: config.yaml)
    DATABASE_URL        SQLite database URL
    JWT_SECRET          Token signing secret (at least 32 characters)

CONFIGURATION:
    The application looks for configuration files in the following order:
    1. Path specified by MEDSAS_CONFIG environment variable
    2. ./config.yaml
    3. ./config/config.yaml
    4. /etc/medsas/config.yaml

The lifecycle sweep can also be run on its own with `run-lifecycle-sweep`."#,
        env!("CARGO_PKG_VERSION")
    );
}
