use anyhow::Result;
use ie_board::config::BoardConfig;
use ie_board::{server, Board, SolanaRpc};
use log::{info, warn};
use std::sync::Arc;
use warp::Filter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = BoardConfig::from_env()?;
    let listen_address = config.listen_address.parse::<std::net::IpAddr>()?;
    let listen_port = config.listen_port;
    info!(
        "mint {}: {} bundles, {} team and {} marketing addresses",
        config.mint,
        config.bundles.len(),
        config.team.len(),
        config.marketing.len()
    );

    let rpc = Arc::new(SolanaRpc::new(config.rpc_url.clone()));
    let board = Arc::new(Board::new(rpc, config));

    // Warm the views; the service still starts if the chain is unreachable.
    if let Err(e) = board.refresh().await {
        warn!("initial refresh failed: {}", e);
    }

    let routes = server::routes(board).with(warp::cors().allow_any_origin());

    info!("listening on {}:{}", listen_address, listen_port);
    warp::serve(routes).run((listen_address, listen_port)).await;

    Ok(())
}
