use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use clap::Parser;
use pgrid_index::config::NodeConfig;
use pgrid_index::distribution::distributor::Distributor;
use pgrid_index::index::handlers::*;
use pgrid_index::index::keys::KeyRegistry;
use pgrid_index::index::local::LocalIndex;
use pgrid_index::index::manager::IndexManager;
use pgrid_index::index::protocol::*;
use pgrid_index::index::types::TrieKey;
use pgrid_index::routing::handlers::handle_route;
use pgrid_index::routing::http::HttpRouter;
use pgrid_index::routing::peer::LocalPeer;
use pgrid_index::routing::protocol::ENDPOINT_ROUTE;
use pgrid_index::routing::table::{Placement, RoutingTable};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "pgrid-node", about = "P-Grid index distribution node")]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP listen address, overrides the config.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Trie path of this peer (bit string), overrides the config.
    #[arg(long)]
    path: Option<TrieKey>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(path) = args.path {
        config.path = path;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    let info = config.peer_info();
    tracing::info!(
        "Starting peer {:?} on {} with path {} (super-peer={})",
        info.id,
        config.bind,
        config.path,
        config.super_peer
    );

    // 1. Local peer and routing table:
    let peer = Arc::new(LocalPeer::new(info, config.path.clone(), config.super_peer));
    let table = Arc::new(RoutingTable::new(peer.clone()));
    for known in &config.peers {
        match table.add_peer(known.to_ref()) {
            Placement::Level(level) => {
                tracing::info!("  - {} ({}) at level {}", known.id, known.path, level)
            }
            Placement::Replica => tracing::info!("  - {} ({}) replica", known.id, known.path),
            Placement::Ignored => {}
        }
    }

    // 2. Storage and distribution:
    std::fs::create_dir_all(&config.data_dir)?;
    let index = Arc::new(LocalIndex::open(&config.data_dir)?);
    let keys = KeyRegistry::new(config.key_bits);

    let router = Arc::new(HttpRouter::with_retry(
        table.clone(),
        tokio::runtime::Handle::current(),
        config.route_timeout(),
        config.route_attempts,
    ));

    let distributor = Distributor::new(
        peer.clone(),
        router,
        index.clone(),
        keys.clone(),
        config.idle_poll(),
    );
    distributor.start()?;

    let manager = IndexManager::new(peer, index.clone(), keys, distributor.clone());

    // 3. HTTP Router:
    let app = Router::new()
        .route(ENDPOINT_ROUTE, post(handle_route))
        .route(ENDPOINT_INSERT, post(handle_insert))
        .route(ENDPOINT_UPDATE, post(handle_update))
        .route(ENDPOINT_DELETE, post(handle_delete))
        .route(&format!("{}/:prefix", ENDPOINT_QUERY), get(handle_query))
        .route(ENDPOINT_STATS, get(handle_stats))
        .layer(Extension(manager))
        .layer(Extension(index))
        .layer(Extension(distributor.clone()));

    // 4. Start HTTP server:
    tracing::info!("HTTP server listening on {}", config.bind);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tokio::task::spawn_blocking(move || distributor.shutdown()).await?;
    Ok(())
}
