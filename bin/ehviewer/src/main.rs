use std::{env, net::Ipv4Addr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result, anyhow};
use axum::{Json, Router, routing::get};
use clap::Parser;
use directories::ProjectDirs;
use ehviewer_filter_server::FilterStore;
use ehviewer_tag_server::{TagService, TagSource};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "ehviewer";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sets the Host IP to bind the server to
    #[arg(long, default_value = "0.0.0.0", env = "EHVIEWER_HOST")]
    host: Ipv4Addr,

    /// Sets the Port to bind the server to
    #[arg(long, default_value_t = 4570, env = "EHVIEWER_PORT")]
    port: u16,

    /// Directory for the filter database and downloaded tag translations
    #[arg(long, env = "EHVIEWER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, default_value = "tag-translations.bin.sha1", env = "EHVIEWER_TAG_SHA1_NAME")]
    tag_sha1_name: String,

    #[arg(long, env = "EHVIEWER_TAG_SHA1_URL")]
    tag_sha1_url: Option<String>,

    #[arg(long, default_value = "tag-translations.bin", env = "EHVIEWER_TAG_DATA_NAME")]
    tag_data_name: String,

    #[arg(long, env = "EHVIEWER_TAG_DATA_URL")]
    tag_data_url: Option<String>,

    /// Skips the tag translation update check on start-up
    #[arg(long, env = "EHVIEWER_NO_REFRESH")]
    no_refresh: bool,
}

impl Cli {
    /// Tag source plus whether it can be downloaded at all.
    fn tag_source(&self) -> (TagSource, bool) {
        let remote = self.tag_sha1_url.is_some() && self.tag_data_url.is_some();
        let source = TagSource {
            sha1_name: self.tag_sha1_name.clone(),
            sha1_url: self.tag_sha1_url.clone().unwrap_or_default(),
            data_name: self.tag_data_name.clone(),
            data_url: self.tag_data_url.clone().unwrap_or_default(),
        };
        (source, remote)
    }
}

fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    let dirs = ProjectDirs::from("", "", APP_NAME)
        .ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

fn build_app(tags: Arc<TagService>, filters: Arc<FilterStore>) -> Router {
    Router::new()
        .route("/api/health", get(|| async { Json("ok") }))
        .nest("/api/tags", ehviewer_tag_server::create_router(tags))
        .nest("/api/filters", ehviewer_filter_server::create_router(filters))
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let rust_log = env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let env_filter = match rust_log.is_empty() {
        true => EnvFilter::builder().parse_lossy("info"),
        false => EnvFilter::builder().parse_lossy(rust_log),
    };
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let data_dir = resolve_data_dir(args.data_dir.clone())?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
    info!("📂 Data directory: {}", data_dir.display());

    let (source, remote) = args.tag_source();
    if !remote {
        warn!("[Tags] No download URLs configured, serving local translations only.");
    }
    let tags =
        ehviewer_tag_server::create_service(&data_dir, source, remote && !args.no_refresh).await?;
    let filters = ehviewer_filter_server::create_store(&data_dir)?;

    let app = build_app(tags, filters);

    let listener_addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&listener_addr)
        .await
        .map_err(|err| anyhow!("Failed to create server socket on {listener_addr}: {err:?}"))?;

    info!("✅ Server listening on {listener_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("🛑 Received Ctrl+C, shutting down server..."),
                Err(err) => error!("Unable to listen for shutdown signal: {err}"),
            }
        })
        .await?;

    info!("✅ Web server shutdown complete.");
    Ok(())
}
