pub mod config;
pub mod media;
pub mod swap;
pub mod upload;
pub mod wallet;

pub use swap::{QuoteDebouncer, QuoteUpdate, SwapClient};
pub use upload::{ArweaveUploader, ArweaveWallet, HttpUploader, Progress, UploadFile, Uploader};
pub use wallet::{select_wallet, WalletProvider};
