use crate::bundles::parse_bundles;
use abi::Bundle;
use anyhow::{anyhow, Result};
use log::warn;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_LISTEN_PORT: u16 = 3030;

/// Leaves drawn on the bubble map.
pub const TARGET_LEAF_COUNT: usize = 100;
pub const LEADERBOARD_PAGE_SIZE: usize = 25;
/// Holders whose history is looked up for the days-held board.
pub const DAYS_HELD_TOP_N: usize = 100;
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(300);

lazy_static::lazy_static! {
    static ref ADDRESS_RE: regex::Regex = regex::Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").unwrap();
}

pub fn looks_like_address(s: &str) -> bool {
    ADDRESS_RE.is_match(s)
}

/// `RPC_URL` wins over a Helius `API_KEY`; falls back to the public endpoint.
pub fn rpc_url_from_env() -> String {
    match (env::var("RPC_URL"), env::var("API_KEY")) {
        (Ok(url), _) => url,
        (Err(_), Ok(api_key)) => format!("https://mainnet.helius-rpc.com/?api-key={}", api_key),
        _ => DEFAULT_RPC_URL.to_string(),
    }
}

pub fn mint_from_env() -> Result<Pubkey> {
    let mint = env::var("IE_MINT").map_err(|_| anyhow!("IE_MINT must be set"))?;
    let mint = mint.trim();
    if !looks_like_address(mint) {
        return Err(anyhow!("IE_MINT is not a base58 address: {}", mint));
    }
    Ok(Pubkey::from_str(mint)?)
}

#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub rpc_url: String,
    pub mint: Pubkey,
    pub bundles: Vec<Bundle>,
    pub team: HashSet<Pubkey>,
    pub marketing: HashSet<Pubkey>,
    pub target_leaf_count: usize,
    pub page_size: usize,
    pub days_held_top_n: usize,
    pub listen_address: String,
    pub listen_port: u16,
}

impl BoardConfig {
    /// Reads the process environment; call `dotenv` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        let rpc_url = rpc_url_from_env();
        let mint = mint_from_env()?;

        let listen_port = match env::var("LISTEN_PORT") {
            Ok(port) => port.parse::<u16>()?,
            Err(_) => DEFAULT_LISTEN_PORT,
        };

        Ok(BoardConfig {
            rpc_url,
            mint,
            bundles: parse_bundles(&env::var("IE_BUNDLES").unwrap_or_default()),
            team: address_set(&env::var("TEAM_ADDRESSES").unwrap_or_default()),
            marketing: address_set(&env::var("MARKETING_ADDRESSES").unwrap_or_default()),
            target_leaf_count: TARGET_LEAF_COUNT,
            page_size: LEADERBOARD_PAGE_SIZE,
            days_held_top_n: DAYS_HELD_TOP_N,
            listen_address: env::var("LISTEN_ADDRESS").unwrap_or_else(|_| DEFAULT_LISTEN_ADDRESS.to_string()),
            listen_port,
        })
    }
}

/// Comma-separated addresses; invalid entries are logged and dropped.
pub fn address_set(list: &str) -> HashSet<Pubkey> {
    list.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| match Pubkey::from_str(s) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("ignoring address {}: {}", s, e);
                None
            }
        })
        .collect()
}
