pub mod board;
pub mod bundles;
pub mod config;
pub mod holders;
pub mod leaderboard;
pub mod rpc;
pub mod server;
pub mod summary;

pub use board::{Board, Snapshot};
pub use rpc::{ChainRpc, RawAccount, SolanaRpc};
