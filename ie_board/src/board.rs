use crate::bundles::build_hierarchy;
use crate::config::BoardConfig;
use crate::holders::{fetch_holders, fetch_mint_info};
use crate::leaderboard::days_held_leaderboard;
use crate::rpc::ChainRpc;
use crate::summary::summarize;
use abi::{DaysHeldEntry, HierarchyNode, HolderList, IeResult, MintInfo, Summary};
use log::{info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Everything one refresh cycle produces.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub mint: MintInfo,
    pub holders: HolderList,
    pub hierarchy: Vec<HierarchyNode>,
    pub summary: Summary,
    pub days_held: Vec<DaysHeldEntry>,
    pub taken_at: Instant,
}

/// View state for the service. A refresh builds a whole new snapshot and
/// swaps it in at once; a failed refresh leaves the old one in place.
pub struct Board {
    rpc: Arc<dyn ChainRpc>,
    config: BoardConfig,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    refreshing: Mutex<()>,
}

impl Board {
    pub fn new(rpc: Arc<dyn ChainRpc>, config: BoardConfig) -> Self {
        Board {
            rpc,
            config,
            snapshot: RwLock::new(None),
            refreshing: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub async fn refresh(&self) -> IeResult<Arc<Snapshot>> {
        let _guard = self.refreshing.lock().await;
        self.rebuild().await
    }

    /// Refreshes unless the snapshot is younger than `ttl`. The age is checked
    /// again once the refresh lock is held, so callers queued behind another
    /// refresh reuse its result instead of scanning again.
    pub async fn refresh_if_older_than(&self, ttl: Duration) -> IeResult<Arc<Snapshot>> {
        let _guard = self.refreshing.lock().await;
        if let Some(snapshot) = self.fresh(ttl).await {
            return Ok(snapshot);
        }
        self.rebuild().await
    }

    async fn fresh(&self, ttl: Duration) -> Option<Arc<Snapshot>> {
        self.snapshot
            .read()
            .await
            .clone()
            .filter(|snapshot| snapshot.taken_at.elapsed() < ttl)
    }

    // callers hold `refreshing`
    async fn rebuild(&self) -> IeResult<Arc<Snapshot>> {
        let start_time = Instant::now();
        let snapshot = Arc::new(build_snapshot(self.rpc.as_ref(), &self.config).await?);
        *self.snapshot.write().await = Some(snapshot.clone());
        info!(
            "snapshot refreshed: {} holders, {} nodes in {:?}",
            snapshot.holders.len(),
            snapshot.hierarchy.len(),
            start_time.elapsed()
        );
        Ok(snapshot)
    }

    /// The current snapshot, refreshed first when missing or older than
    /// `ttl`. If that refresh fails a stale snapshot is still served.
    pub async fn current(&self, ttl: Duration) -> IeResult<Arc<Snapshot>> {
        let existing = self.snapshot.read().await.clone();
        match existing {
            Some(snapshot) if snapshot.taken_at.elapsed() < ttl => Ok(snapshot),
            Some(stale) => match self.refresh_if_older_than(ttl).await {
                Ok(fresh) => Ok(fresh),
                Err(e) => {
                    warn!("refresh failed, serving snapshot from {:?} ago: {}", stale.taken_at.elapsed(), e);
                    Ok(stale)
                }
            },
            None => self.refresh_if_older_than(ttl).await,
        }
    }
}

pub async fn build_snapshot(rpc: &dyn ChainRpc, config: &BoardConfig) -> IeResult<Snapshot> {
    let mint = fetch_mint_info(rpc, &config.mint).await?;
    let holders = fetch_holders(rpc, &config.mint, &mint.program_id, mint.decimals).await?;
    let hierarchy = build_hierarchy(&holders, &config.bundles, config.target_leaf_count);
    let summary = summarize(&holders, &mint, &config.team, &config.marketing);
    let now = chrono::Utc::now().timestamp();
    let days_held = days_held_leaderboard(rpc, &holders, config.days_held_top_n, now).await;

    Ok(Snapshot {
        mint,
        holders,
        hierarchy,
        summary,
        days_held,
        taken_at: Instant::now(),
    })
}
