use crate::swap::JUPITER_API;
use crate::upload::arweave::ARWEAVE_GATEWAY;
use anyhow::Result;
use ie_board::config::{mint_from_env, rpc_url_from_env};
use solana_sdk::pubkey::Pubkey;
use std::env;

pub const DEFAULT_WALLET_KIND: &str = "keypair";
pub const DEFAULT_KEYPAIR_PATH: &str = "~/.config/solana/id.json";
pub const WALLET_SECRET_VAR: &str = "WALLET_SECRET";
pub const DEFAULT_ARWEAVE_WALLET: &str = "~/.config/arweave/wallet.json";

#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub rpc_url: String,
    pub mint: Pubkey,
    pub jupiter_api: String,
    pub jupiter_api_key: Option<String>,
    pub upload_endpoint: Option<String>,
    pub upload_token: Option<String>,
    pub arweave_gateway: String,
    /// JWK keyfile that pays for permanent storage.
    pub arweave_wallet: String,
    pub wallet_kind: String,
    pub keypair_path: String,
}

impl ToolsConfig {
    pub fn from_env() -> Result<Self> {
        Ok(ToolsConfig {
            rpc_url: rpc_url_from_env(),
            mint: mint_from_env()?,
            jupiter_api: env::var("JUPITER_API").unwrap_or_else(|_| JUPITER_API.to_string()),
            jupiter_api_key: env::var("JUPITER_API_KEY").ok(),
            upload_endpoint: env::var("UPLOAD_ENDPOINT").ok(),
            upload_token: env::var("UPLOAD_TOKEN").ok(),
            arweave_gateway: env::var("ARWEAVE_GATEWAY").unwrap_or_else(|_| ARWEAVE_GATEWAY.to_string()),
            arweave_wallet: expand_home(&env::var("ARWEAVE_WALLET").unwrap_or_else(|_| DEFAULT_ARWEAVE_WALLET.to_string())),
            wallet_kind: env::var("WALLET_KIND").unwrap_or_else(|_| DEFAULT_WALLET_KIND.to_string()),
            keypair_path: expand_home(&env::var("KEYPAIR_PATH").unwrap_or_else(|_| DEFAULT_KEYPAIR_PATH.to_string())),
        })
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_is_expanded() {
        let home = env::var("HOME").unwrap_or_default();
        if !home.is_empty() {
            assert!(expand_home("~/.config/solana/id.json").ends_with("/.config/solana/id.json"));
            assert!(!expand_home("~/x").starts_with('~'));
        }
        assert_eq!(expand_home("/abs/id.json"), "/abs/id.json");
    }
}
