use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

mod daemon;
mod supervisor;

pub use daemon::detach;
pub use supervisor::Supervisor;

/// A pool of identical workers kept alive by a [`Supervisor`].
#[async_trait]
pub trait Forker: Send + Sync + 'static {
    /// One-time setup before any worker starts. The returned count decides the
    /// pool: `-n` keeps `n` workers alive forever, `n` runs `n` workers once,
    /// `0` starts nothing.
    async fn start_parent_process(&self) -> Result<i32>;

    /// Body of the worker in `slot`. Returning, failing or being killed all
    /// count as an exit.
    async fn start_child_process(&self, slot: usize) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSize {
    pub workers: usize,
    pub permanent: bool,
}

impl From<i32> for PoolSize {
    fn from(count: i32) -> Self {
        Self {
            workers: count.unsigned_abs() as usize,
            permanent: count < 0,
        }
    }
}

pub async fn start<F: Forker>(forker: Arc<F>) -> Result<Supervisor> {
    let pool = PoolSize::from(forker.start_parent_process().await?);

    info!(workers = pool.workers, permanent = pool.permanent, "starting pool");

    Ok(Supervisor::spawn(forker, pool))
}
