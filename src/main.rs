mod config;
mod constants;
mod data_structures;
mod forker;
mod fs;
mod logging;
mod macros;
mod persistence;
mod seeder;
mod transcoding;

use anyhow::{Context, Result};
use config::Config;
use persistence::{MemoryPersistence, Persistence};
use seeder::{Peer, Server};
use std::path::Path;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use transcoding::metainfo::Torrent;

fn main() -> Result<()> {
    let mut config = Config::new();
    config.resolve_paths()?;

    // before any runtime thread exists
    if config.detach {
        forker::detach(&config.pid_file)?;
    }

    logging::setup(config.log_level, config.log_file.as_deref())?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let persistence: Arc<dyn Persistence> = Arc::new(MemoryPersistence::new());

    for path in &config.seed {
        seed(&config, persistence.as_ref(), path)
            .await
            .with_context(|| format!("unable to seed {}", path.display()))?;
    }

    if config.seed.is_empty() {
        warn!("no files to seed, only torrents announced by others will be served");
    }

    let peer = Peer::new(config.peer_config(), persistence.clone());
    let server = Arc::new(Server::new(peer, persistence, config.announce_interval()));

    let supervisor = forker::start(server.clone()).await?;
    info!(
        addr = ?server.peer().local_addr(),
        peer_id = ?server.peer().peer_id(),
        "started"
    );

    shutdown_signal().await?;

    info!(
        live = supervisor.live_workers(),
        started = supervisor.started(),
        "shutting down"
    );
    supervisor.shutdown();

    Ok(())
}

async fn seed(config: &Config, persistence: &dyn Persistence, path: &Path) -> Result<()> {
    let torrent = Torrent::from_file(path, config.piece_length, config.private).await?;

    if let Some(dir) = &config.torrent_dir {
        tokio::fs::create_dir_all(dir).await?;

        let target = dir.join(format!("{}.torrent", torrent.info.name));
        tokio::fs::write(&target, torrent.to_metainfo(&config.announce)?).await?;

        info!(path = %target.display(), "metainfo written");
    }

    info!("seeding\n{torrent}");
    info!(magnet = %torrent.magnet_uri(&config.announce));

    persistence.save_torrent(torrent).await
}

async fn shutdown_signal() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }

    Ok(())
}
