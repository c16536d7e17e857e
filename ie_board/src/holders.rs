use crate::rpc::ChainRpc;
use abi::{HolderList, IeError, IeResult, MintInfo, TokenAccountRecord};
use log::{debug, info, warn};
use spl_token_2022::solana_program::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_token_2022::extension::StateWithExtensions;
use spl_token_2022::state::{Account, Mint};

/// Reads the mint account: decimals, supply and the owning token program.
pub async fn fetch_mint_info(rpc: &dyn ChainRpc, mint: &Pubkey) -> IeResult<MintInfo> {
    let account = rpc.get_account(*mint).await?;
    if account.owner != spl_token::ID && account.owner != spl_token_2022::ID {
        return Err(IeError::DataUnavailable(format!(
            "{} is not owned by a token program",
            mint
        )));
    }
    let state = StateWithExtensions::<Mint>::unpack(&account.data)
        .map_err(|e| IeError::DataUnavailable(format!("mint {} could not be decoded: {}", mint, e)))?;

    Ok(MintInfo {
        decimals: state.base.decimals,
        supply: state.base.supply,
        program_id: account.owner,
    })
}

/// Scans every token account of `mint` and returns the non-zero holders,
/// largest first.
///
/// The scan is a single request. Providers that silently cap result sizes
/// produce a truncated list that cannot be detected here.
pub async fn fetch_holders(
    rpc: &dyn ChainRpc,
    mint: &Pubkey,
    program_id: &Pubkey,
    decimals: u8,
) -> IeResult<HolderList> {
    // Token-2022 accounts carry extensions, so their size varies.
    let data_size = if *program_id == spl_token::ID {
        Some(spl_token::state::Account::LEN as u64)
    } else {
        None
    };

    let accounts = rpc.scan_token_accounts(*program_id, *mint, data_size).await?;
    info!("decoding {} token accounts for mint {}", accounts.len(), mint);

    let records = accounts
        .iter()
        .filter_map(|(address, data)| match decode_token_account(address, data, decimals) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("skipping account: {}", e);
                None
            }
        })
        .collect();

    let holders = rank_holders(records);
    debug!("{} holders with a non-zero balance", holders.len());
    Ok(holders)
}

pub fn decode_token_account(
    address: &Pubkey,
    data: &[u8],
    decimals: u8,
) -> IeResult<TokenAccountRecord> {
    let state = StateWithExtensions::<Account>::unpack(data).map_err(|e| IeError::partial(address, e))?;
    Ok(TokenAccountRecord {
        address: *address,
        owner: state.base.owner,
        mint: state.base.mint,
        raw_amount: state.base.amount,
        ui_amount: to_ui_amount(state.base.amount, decimals),
    })
}

pub fn to_ui_amount(raw_amount: u64, decimals: u8) -> f64 {
    raw_amount as f64 / 10f64.powi(decimals as i32)
}

/// Drops zero balances and sorts by raw amount descending. The sort is
/// stable, so equal balances keep their scan order.
pub fn rank_holders(mut records: Vec<TokenAccountRecord>) -> HolderList {
    records.retain(|record| record.raw_amount > 0);
    records.sort_by(|a, b| b.raw_amount.cmp(&a.raw_amount));
    records
}
