use anyhow::{Context, Result};
use axum::Router;
use gallery_upload::{
    config::{ClientConfig, Mode, ServerConfig},
    routes,
    services::{
        authorizer::TokenAuthorizer,
        media_manager::MediaManager,
        metadata_store::SqliteMetadataStore,
        orchestrator::UploadOrchestrator,
        signing_client::HttpSigningClient,
        signing_service::SigningService,
        transfer::HttpTransfer,
    },
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{io::ErrorKind, path::Path, path::PathBuf, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Mode::from_env_and_args()? {
        Mode::Migrate { database_url } => {
            let store = open_store(&database_url).await?;
            store.run_migrations().await?;
            tracing::info!("Database migration complete.");
            Ok(())
        }
        Mode::Serve(cfg) => serve(cfg).await,
        Mode::Upload {
            client,
            gallery,
            title,
            concurrency,
            files,
        } => upload(client, &gallery, &title, concurrency, files).await,
        Mode::Purge { client, gallery } => purge(client, &gallery).await,
    }
}

async fn serve(cfg: ServerConfig) -> Result<()> {
    tracing::info!(
        "Starting signing service on {} for bucket {:?}",
        cfg.addr(),
        cfg.storage.credential.bucket
    );

    let authorizer = TokenAuthorizer::new(cfg.tokens.iter().cloned());
    if authorizer.trusts_upstream() {
        tracing::warn!("No operator tokens configured; trusting upstream session validation");
    }

    // --- Initialize core service; incomplete storage settings stop startup here ---
    let service = SigningService::new(cfg.storage.clone(), Arc::new(authorizer), reqwest::Client::new())
        .inspect_err(|e| tracing::error!("storage configuration rejected: {}", e))
        .context("invalid storage configuration")?;

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn upload(
    client: ClientConfig,
    gallery: &str,
    title: &str,
    concurrency: usize,
    paths: Vec<PathBuf>,
) -> Result<()> {
    let store = Arc::new(open_store(&client.database_url).await?);
    store.run_migrations().await?;
    store.ensure_gallery(gallery, title).await?;

    let http = reqwest::Client::new();
    let signer = HttpSigningClient::new(client.signer_url, client.token, http.clone());
    let orchestrator =
        UploadOrchestrator::new(Arc::new(signer), Arc::new(HttpTransfer::new(http)), store)
            .with_concurrency(concurrency);

    let result = orchestrator.upload_paths(gallery, paths).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.failed.is_empty() {
        anyhow::bail!("{} of {} file(s) failed", result.failed.len(), result.total);
    }
    Ok(())
}

async fn purge(client: ClientConfig, gallery: &str) -> Result<()> {
    let store = Arc::new(open_store(&client.database_url).await?);
    let signer = HttpSigningClient::new(client.signer_url, client.token, reqwest::Client::new());
    let manager = MediaManager::new(Arc::new(signer), store);

    let summary = manager.remove_gallery_media(gallery).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Open the SQLite metadata database, creating its directory if needed.
async fn open_store(database_url: &str) -> Result<SqliteMetadataStore> {
    tracing::debug!("Connecting using raw URL => {}", database_url);

    let db_path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if !db_path.starts_with(":memory:") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parsing database URL `{}`", database_url))?
        .create_if_missing(true)
        .foreign_keys(true);
    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {}", database_url))?;

    Ok(SqliteMetadataStore::new(Arc::new(db)))
}
