use crate::holders::to_ui_amount;
use abi::{MintInfo, Summary, TokenAccountRecord};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;

pub fn summarize(
    holders: &[TokenAccountRecord],
    mint: &MintInfo,
    team: &HashSet<Pubkey>,
    marketing: &HashSet<Pubkey>,
) -> Summary {
    Summary {
        holder_count: holders.iter().map(|h| h.owner).collect::<HashSet<_>>().len(),
        total_supply: to_ui_amount(mint.supply, mint.decimals),
        team_percentage: share_of_supply(holders, team, mint.supply),
        marketing_percentage: share_of_supply(holders, marketing, mint.supply),
    }
}

/// Percent of `supply` held by accounts whose owner is in `owners`.
pub fn share_of_supply(holders: &[TokenAccountRecord], owners: &HashSet<Pubkey>, supply: u64) -> f64 {
    if supply == 0 {
        return 0.0;
    }
    let held: u128 = holders
        .iter()
        .filter(|h| owners.contains(&h.owner))
        .map(|h| h.raw_amount as u128)
        .sum();
    held as f64 / supply as f64 * 100.0
}
