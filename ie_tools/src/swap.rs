use crate::wallet::{sign_versioned, WalletProvider};
use abi::{IeError, IeResult, Quote, TxStatus};
use base64::Engine;
use ie_board::ChainRpc;
use log::{debug, info, warn};
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const JUPITER_API: &str = "https://lite-api.jup.ag/swap/v1";
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const SOL_DECIMALS: u8 = 9;
/// 0.5%
pub const DEFAULT_SLIPPAGE_BPS: u64 = 50;
/// Lamports kept back for network fees and rent when checking a swap.
pub const FEE_RESERVE_LAMPORTS: u64 = 10_000_000;
pub const QUOTE_DEBOUNCE: Duration = Duration::from_millis(500);
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

pub struct SwapClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    input_mint: String,
    output_mint: Pubkey,
    slippage_bps: u64,
    poll_interval: Duration,
}

impl SwapClient {
    /// Buys `output_mint` with SOL through the aggregator at `base_url`.
    pub fn new(base_url: impl Into<String>, output_mint: Pubkey) -> Self {
        SwapClient {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            input_mint: SOL_MINT.to_string(),
            output_mint,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_slippage_bps(mut self, slippage_bps: u64) -> Self {
        self.slippage_bps = slippage_bps;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    pub async fn get_quote(&self, amount_in: u64) -> IeResult<Quote> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url, self.input_mint, self.output_mint, amount_in, self.slippage_bps
        );
        debug!("requesting quote for {} lamports", amount_in);

        let resp = self
            .authorized(self.http.get(&url))
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .map_err(IeError::unavailable)?;
        let body = aggregator_body(resp, "quote", "no route found").await?;
        parse_quote(body)
    }

    /// Checks funds, fetches the swap transaction for `quote`, signs it with
    /// `wallet`, submits it and waits up to `timeout` for confirmation.
    pub async fn execute_swap(
        &self,
        rpc: &dyn ChainRpc,
        quote: &Quote,
        wallet: &dyn WalletProvider,
        timeout: Duration,
    ) -> IeResult<Signature> {
        let user = wallet.public_key().ok_or(IeError::WalletNotConnected)?;
        let balance = rpc.get_balance(user).await?;
        ensure_funds(balance, quote.in_amount)?;

        let body = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": user.to_string(),
            "wrapAndUnwrapSol": true,
        });
        let resp = self
            .authorized(self.http.post(format!("{}/swap", self.base_url)))
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(IeError::unavailable)?;
        let swap = aggregator_body(resp, "swap", "no swap transaction").await?;
        let encoded = swap
            .get("swapTransaction")
            .and_then(|v| v.as_str())
            .ok_or_else(|| IeError::unavailable("aggregator did not return a swap transaction"))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(IeError::unavailable)?;
        let mut transaction: VersionedTransaction = bincode::deserialize(&bytes).map_err(IeError::unavailable)?;
        sign_versioned(&mut transaction, wallet)?;

        let signature = rpc.send_transaction(transaction).await?;
        info!("swap submitted: {}", signature);
        wait_for_confirmation(rpc, signature, timeout, self.poll_interval).await?;
        info!("swap confirmed: {}", signature);
        Ok(signature)
    }
}

/// Reads an aggregator response. A non-2xx status or an `error` field becomes
/// `DataUnavailable` carrying the aggregator's own message.
async fn aggregator_body(resp: reqwest::Response, what: &str, fallback: &str) -> IeResult<serde_json::Value> {
    let status = resp.status();
    let text = resp.text().await.map_err(IeError::unavailable)?;
    let body: Option<serde_json::Value> = serde_json::from_str(&text).ok();
    let error = body.as_ref().and_then(|b| b.get("error"));

    if !status.is_success() || error.is_some() {
        let msg = error
            .and_then(|v| v.as_str())
            .unwrap_or(fallback);
        return Err(IeError::DataUnavailable(format!("{} failed ({}): {}", what, status, msg)));
    }
    body.ok_or_else(|| IeError::DataUnavailable(format!("{} response is not JSON", what)))
}

/// Rejects a swap of `amount_in` lamports that would eat into the fee
/// reserve.
pub fn ensure_funds(balance: u64, amount_in: u64) -> IeResult<()> {
    let required = amount_in.saturating_add(FEE_RESERVE_LAMPORTS);
    if balance < required {
        return Err(IeError::InsufficientFunds {
            required,
            available: balance,
        });
    }
    Ok(())
}

pub async fn wait_for_confirmation(
    rpc: &dyn ChainRpc,
    signature: Signature,
    timeout: Duration,
    poll_interval: Duration,
) -> IeResult<()> {
    let poll = async {
        loop {
            match rpc.signature_status(signature).await {
                Ok(TxStatus::Confirmed) => return Ok(()),
                Ok(TxStatus::Failed) => {
                    return Err(IeError::DataUnavailable(format!("transaction {} failed on chain", signature)))
                }
                Ok(TxStatus::Pending) => {}
                Err(e) => warn!("status lookup for {} failed: {}", signature, e),
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(IeError::Timeout {
            what: format!("confirmation of {}", signature),
            waited: timeout,
        }),
    }
}

fn parse_quote(body: serde_json::Value) -> IeResult<Quote> {
    let amount = |field: &str| -> IeResult<u64> {
        body.get(field)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| IeError::DataUnavailable(format!("quote is missing {}", field)))
    };

    let in_amount = amount("inAmount")?;
    let out_amount = amount("outAmount")?;
    let other_amount_threshold = amount("otherAmountThreshold").unwrap_or(out_amount);
    let price_impact_pct = body
        .get("priceImpactPct")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    let slippage_bps = body.get("slippageBps").and_then(|v| v.as_u64()).unwrap_or(0);
    let route = body
        .get("routePlan")
        .and_then(|v| v.as_array())
        .map(|plan| {
            plan.iter()
                .filter_map(|r| r.pointer("/swapInfo/label").and_then(|v| v.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Quote {
        in_amount,
        out_amount,
        other_amount_threshold,
        price_impact_pct,
        slippage_bps,
        route,
        raw: body,
    })
}

/// Parses a decimal SOL amount into lamports without going through floats.
pub fn parse_sol_amount(input: &str) -> IeResult<u64> {
    let input = input.trim();
    let (whole, frac) = match input.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (input, ""),
    };
    if (whole.is_empty() && frac.is_empty())
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return Err(IeError::invalid(format!("not an amount: {:?}", input)));
    }
    if frac.len() > SOL_DECIMALS as usize {
        return Err(IeError::invalid(format!("too many decimal places (max {})", SOL_DECIMALS)));
    }

    let scale = 10u64.pow(SOL_DECIMALS as u32);
    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(IeError::invalid)? };
    let frac: u64 = if frac.is_empty() {
        0
    } else {
        frac.parse::<u64>().map_err(IeError::invalid)? * 10u64.pow(SOL_DECIMALS as u32 - frac.len() as u32)
    };
    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| IeError::invalid("amount too large"))
}

#[derive(Debug)]
pub enum QuoteUpdate {
    /// Input was empty, zero or not a number: show no estimate.
    Cleared,
    /// A newer input arrived; this result must not be shown.
    Superseded,
    Ready(Quote),
    Failed(IeError),
}

/// Applies only the quote for the most recent input.
pub struct QuoteDebouncer {
    client: SwapClient,
    delay: Duration,
    generation: AtomicU64,
}

impl QuoteDebouncer {
    pub fn new(client: SwapClient, delay: Duration) -> Self {
        QuoteDebouncer {
            client,
            delay,
            generation: AtomicU64::new(0),
        }
    }

    pub async fn request(&self, input: &str) -> QuoteUpdate {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let amount = match parse_sol_amount(input) {
            Ok(amount) if amount > 0 => amount,
            _ => return QuoteUpdate::Cleared,
        };

        tokio::time::sleep(self.delay).await;
        if !self.is_current(generation) {
            return QuoteUpdate::Superseded;
        }

        let result = self.client.get_quote(amount).await;
        if !self.is_current(generation) {
            debug!("discarding stale quote for {} lamports", amount);
            return QuoteUpdate::Superseded;
        }
        match result {
            Ok(quote) => QuoteUpdate::Ready(quote),
            Err(e) => QuoteUpdate::Failed(e),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}
