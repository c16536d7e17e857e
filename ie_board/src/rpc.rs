use abi::{IeError, IeResult, SignatureRecord, TxStatus};
use async_trait::async_trait;
use log::debug;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::{
    RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcTransactionConfig,
};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::UiTransactionEncoding;
use std::str::FromStr;
use std::time::Instant;

/// Most signatures a single history lookup returns.
pub const SIGNATURE_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct RawAccount {
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

/// Every remote call the toolkit makes against a Solana node. Views and
/// the swap flow receive this as an explicit handle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Token accounts of `program_id` whose mint field equals `mint`,
    /// optionally restricted to accounts of exactly `data_size` bytes.
    async fn scan_token_accounts(
        &self,
        program_id: Pubkey,
        mint: Pubkey,
        data_size: Option<u64>,
    ) -> IeResult<Vec<(Pubkey, Vec<u8>)>>;

    async fn get_account(&self, address: Pubkey) -> IeResult<RawAccount>;

    /// Newest first, at most `limit` entries.
    async fn signatures_for_address(
        &self,
        address: Pubkey,
        limit: usize,
    ) -> IeResult<Vec<SignatureRecord>>;

    async fn transaction_block_time(&self, signature: String) -> IeResult<Option<i64>>;

    async fn get_balance(&self, address: Pubkey) -> IeResult<u64>;

    async fn send_transaction(&self, transaction: VersionedTransaction) -> IeResult<Signature>;

    async fn signature_status(&self, signature: Signature) -> IeResult<TxStatus>;
}

pub struct SolanaRpc {
    client: RpcClient,
}

impl SolanaRpc {
    pub fn new(rpc_url: String) -> Self {
        SolanaRpc {
            client: RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed()),
        }
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn scan_token_accounts(
        &self,
        program_id: Pubkey,
        mint: Pubkey,
        data_size: Option<u64>,
    ) -> IeResult<Vec<(Pubkey, Vec<u8>)>> {
        let mut filters = Vec::new();
        if let Some(size) = data_size {
            filters.push(RpcFilterType::DataSize(size));
        }
        filters.push(RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
            0,
            mint.to_bytes().to_vec(),
        )));

        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(CommitmentConfig::confirmed()),
                ..Default::default()
            },
            ..Default::default()
        };

        let start_time = Instant::now();
        let accounts = self
            .client
            .get_program_accounts_with_config(&program_id, config)
            .await
            .map_err(IeError::unavailable)?;
        debug!(
            "scanned {} token accounts for mint {} in {:?}",
            accounts.len(),
            mint,
            start_time.elapsed()
        );

        Ok(accounts
            .into_iter()
            .map(|(address, account)| (address, account.data))
            .collect())
    }

    async fn get_account(&self, address: Pubkey) -> IeResult<RawAccount> {
        let account = self
            .client
            .get_account(&address)
            .await
            .map_err(IeError::unavailable)?;
        Ok(RawAccount {
            owner: account.owner,
            data: account.data,
        })
    }

    async fn signatures_for_address(
        &self,
        address: Pubkey,
        limit: usize,
    ) -> IeResult<Vec<SignatureRecord>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(limit.min(SIGNATURE_PAGE_LIMIT)),
            commitment: Some(CommitmentConfig::confirmed()),
        };
        let statuses = self
            .client
            .get_signatures_for_address_with_config(&address, config)
            .await
            .map_err(IeError::unavailable)?;
        Ok(statuses
            .into_iter()
            .map(|status| SignatureRecord {
                signature: status.signature,
                block_time: status.block_time,
            })
            .collect())
    }

    async fn transaction_block_time(&self, signature: String) -> IeResult<Option<i64>> {
        let signature = Signature::from_str(&signature).map_err(|e| IeError::partial(&signature, e))?;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };
        let transaction = self
            .client
            .get_transaction_with_config(&signature, config)
            .await
            .map_err(IeError::unavailable)?;
        Ok(transaction.block_time)
    }

    async fn get_balance(&self, address: Pubkey) -> IeResult<u64> {
        self.client
            .get_balance(&address)
            .await
            .map_err(IeError::unavailable)
    }

    async fn send_transaction(&self, transaction: VersionedTransaction) -> IeResult<Signature> {
        self.client
            .send_transaction(&transaction)
            .await
            .map_err(IeError::unavailable)
    }

    async fn signature_status(&self, signature: Signature) -> IeResult<TxStatus> {
        let response = self
            .client
            .get_signature_statuses(&[signature])
            .await
            .map_err(IeError::unavailable)?;
        let status = match response.value.into_iter().next().flatten() {
            Some(status) => status,
            None => return Ok(TxStatus::Pending),
        };
        if status.err.is_some() {
            Ok(TxStatus::Failed)
        } else if status.satisfies_commitment(CommitmentConfig::confirmed()) {
            Ok(TxStatus::Confirmed)
        } else {
            Ok(TxStatus::Pending)
        }
    }
}
