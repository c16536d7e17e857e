use crate::rpc::{ChainRpc, SIGNATURE_PAGE_LIMIT};
use abi::{DaysHeldEntry, IeError, IeResult, LeaderboardPage, RankedRow, TokenAccountRecord};
use futures::future::join_all;
use log::{debug, warn};
use std::time::Instant;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Cuts one 1-based page out of already ordered rows. Pages past the end
/// clamp to the last page; no rows still yields page 1.
pub fn paginate<T: Clone>(rows: &[T], page: usize, page_size: usize) -> LeaderboardPage<T> {
    let page_size = page_size.max(1);
    let total_pages = rows.len().div_ceil(page_size).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * page_size;
    let total_rows = rows.len();

    let rows = rows
        .iter()
        .enumerate()
        .skip(start)
        .take(page_size)
        .map(|(i, row)| RankedRow {
            rank: i + 1,
            row: row.clone(),
        })
        .collect();

    LeaderboardPage {
        page,
        page_size,
        total_pages,
        total_rows,
        rows,
    }
}

/// Looks up when each of the top `top_n` holders' token accounts first
/// appeared on chain and ranks them by days held, longest first. Ties go
/// to the larger balance.
///
/// Lookups run concurrently. A holder whose history can't be read is
/// logged and left out.
pub async fn days_held_leaderboard(
    rpc: &dyn ChainRpc,
    holders: &[TokenAccountRecord],
    top_n: usize,
    now: i64,
) -> Vec<DaysHeldEntry> {
    let start_time = Instant::now();
    let lookups = holders.iter().take(top_n).map(|holder| async move {
        match first_seen(rpc, holder).await {
            Ok(first_seen) => Some(DaysHeldEntry {
                owner: holder.owner,
                address: holder.address,
                ui_amount: holder.ui_amount,
                first_seen,
                days_held: ((now - first_seen).max(0) / SECONDS_PER_DAY) as u64,
            }),
            Err(e) => {
                warn!("leaving {} out of days held: {}", holder.owner, e);
                None
            }
        }
    });

    let mut entries: Vec<DaysHeldEntry> = join_all(lookups).await.into_iter().flatten().collect();
    entries.sort_by(|a, b| {
        b.days_held
            .cmp(&a.days_held)
            .then(b.ui_amount.total_cmp(&a.ui_amount))
    });
    debug!("days held for {} holders in {:?}", entries.len(), start_time.elapsed());
    entries
}

/// Block time of the oldest signature touching the holder's token account.
/// Histories longer than one signature page start at the oldest entry of
/// that page.
async fn first_seen(rpc: &dyn ChainRpc, holder: &TokenAccountRecord) -> IeResult<i64> {
    let signatures = rpc
        .signatures_for_address(holder.address, SIGNATURE_PAGE_LIMIT)
        .await?;
    let oldest = signatures
        .last()
        .ok_or_else(|| IeError::partial(holder.address, "no transaction history"))?;

    match oldest.block_time {
        Some(block_time) => Ok(block_time),
        None => rpc
            .transaction_block_time(oldest.signature.clone())
            .await?
            .ok_or_else(|| IeError::partial(&oldest.signature, "transaction has no block time")),
    }
}
