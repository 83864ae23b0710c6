mod core;
mod features;
mod modules;
mod shared;

use crate::core::config::{AuthConfig, Config};
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::{database, metrics, middleware};
use crate::features::auth::clients::SessionClient;
use crate::features::auth::{Authenticator, IntegrationTokens};
use crate::features::files::{routes as files_routes, FileService, PgFileRepository};
use crate::modules::storage::MinIOClient;
use axum::{middleware::from_fn, Json, Router};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// File upload and download gateway
#[derive(Parser, Debug)]
#[command(name = "storage-gateway", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Print a signed integration token for INTEGRATIONS_JWT_SECRET and exit
    IssueIntegrationToken {
        /// Integration name carried in the token
        name: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::IssueIntegrationToken { name }) = cli.command {
        return issue_integration_token(name.as_deref().unwrap_or("integration"));
    }

    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

fn issue_integration_token(name: &str) -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let tokens = IntegrationTokens::new(AuthConfig::integrations_secret_from_env());
    let token = tokens
        .issue(name)
        .map_err(|e| anyhow::anyhow!("Cannot issue integration token: {}", e))?;

    println!("{}", token);
    Ok(())
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let available_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        "System info: available_cpus={}, tokio_worker_threads={}, pid={}",
        available_cpus,
        worker_threads,
        std::process::id()
    );

    tracing::info!("Configuration loaded successfully");

    metrics::init_metrics().map_err(|e| anyhow::anyhow!(e))?;
    metrics::describe_metrics();
    metrics::spawn_runtime_collector(Duration::from_secs(1));
    tracing::info!("Prometheus metrics initialized");

    let pool = database::create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");

    tracing::info!("Running database migrations...");
    database::run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
    tracing::info!("Database migrations completed successfully");

    let session_client = SessionClient::new(&config.auth.service_url, config.auth.timeout)
        .map_err(|e| anyhow::anyhow!("Failed to create session client: {}", e))?;
    let integrations = IntegrationTokens::new(config.auth.integrations_secret.clone());
    if integrations.is_enabled() {
        tracing::info!("Integration tokens enabled");
    }
    let authenticator = Arc::new(Authenticator::new(Arc::new(session_client), integrations));
    tracing::info!(
        "Auth configuration initialized (session service: {})",
        config.auth.service_url
    );

    let minio_client = MinIOClient::new(config.minio.clone())
        .map_err(|e| anyhow::anyhow!("Failed to create MinIO client: {}", e))?;
    minio_client
        .ensure_bucket_exists()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to ensure bucket exists: {}", e))?;
    tracing::info!("MinIO client initialized (bucket: {})", minio_client.bucket_name());

    let file_service = Arc::new(FileService::new(
        authenticator,
        Arc::new(PgFileRepository::new(pool)),
        Arc::new(minio_client),
        config.storage.clone(),
    ));
    tracing::info!(
        "File service initialized (download_requires_auth={}, allow_anonymous_upload={})",
        config.storage.download_requires_auth,
        config.storage.allow_anonymous_upload
    );

    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };
    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    let openapi_json = openapi.clone();
    let swagger_routes = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .route(
            "/api/1/swagger",
            axum::routing::get(move || async move { Json(openapi_json) }),
        );

    let swagger = if let Some(credentials) = config.swagger.credentials() {
        tracing::info!("Swagger UI basic auth enabled");
        swagger_routes.layer(from_fn(middleware::basic_auth_middleware(Arc::new(
            credentials,
        ))))
    } else {
        tracing::info!("Swagger UI basic auth disabled (no credentials configured)");
        swagger_routes
    };

    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new()
        .route("/health", axum::routing::get(health_check))
        .route("/metrics", axum::routing::get(metrics::metrics_handler));

    let app = Router::new()
        .merge(swagger)
        .merge(files_routes(file_service))
        .merge(health_route)
        .layer(middleware::cors_layer(
            config.app.cors_allowed_origins.clone(),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid))
        .layer(from_fn(metrics::metrics_middleware));

    let addr = config.app.server_address();
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    // Large bodies are streamed in both directions
    socket.set_recv_buffer_size(256 * 1024)?;
    socket.set_send_buffer_size(256 * 1024)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(65535)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on {}", format!("http://{}", addr));
    tracing::info!(
        "Swagger UI available at {}",
        format!("http://{}/swagger-ui/", addr)
    );

    axum::serve(listener, app).await?;

    Ok(())
}
