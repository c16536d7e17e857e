use abi::{IeError, IeResult};
use log::info;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signature, Signer};
use solana_sdk::transaction::VersionedTransaction;
use std::env;
use std::path::PathBuf;

/// What the swap and upload flows need from a wallet.
pub trait WalletProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn connect(&mut self) -> IeResult<Pubkey>;

    /// `None` until connected.
    fn public_key(&self) -> Option<Pubkey>;

    fn sign_message(&self, message: &[u8]) -> IeResult<Signature>;
}

/// A Solana CLI keypair file (JSON array of 64 bytes).
pub struct KeypairFileWallet {
    path: PathBuf,
    keypair: Option<Keypair>,
}

impl KeypairFileWallet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        KeypairFileWallet {
            path: path.into(),
            keypair: None,
        }
    }
}

impl WalletProvider for KeypairFileWallet {
    fn name(&self) -> &'static str {
        "keypair"
    }

    fn connect(&mut self) -> IeResult<Pubkey> {
        let keypair = read_keypair_file(&self.path)
            .map_err(|e| IeError::invalid(format!("cannot read keypair {}: {}", self.path.display(), e)))?;
        let pubkey = keypair.pubkey();
        self.keypair = Some(keypair);
        info!("connected keypair wallet {}", pubkey);
        Ok(pubkey)
    }

    fn public_key(&self) -> Option<Pubkey> {
        self.keypair.as_ref().map(Keypair::pubkey)
    }

    fn sign_message(&self, message: &[u8]) -> IeResult<Signature> {
        let keypair = self.keypair.as_ref().ok_or(IeError::WalletNotConnected)?;
        Ok(keypair.sign_message(message))
    }
}

/// A base58 encoded 64-byte secret held in an environment variable.
pub struct EnvWallet {
    var: String,
    keypair: Option<Keypair>,
}

impl EnvWallet {
    pub fn new(var: impl Into<String>) -> Self {
        EnvWallet {
            var: var.into(),
            keypair: None,
        }
    }
}

impl WalletProvider for EnvWallet {
    fn name(&self) -> &'static str {
        "env"
    }

    fn connect(&mut self) -> IeResult<Pubkey> {
        let secret = env::var(&self.var).map_err(|_| IeError::invalid(format!("{} is not set", self.var)))?;
        let bytes = bs58::decode(secret.trim())
            .into_vec()
            .map_err(|e| IeError::invalid(format!("{} is not base58: {}", self.var, e)))?;
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| IeError::invalid(format!("{} is not a keypair: {}", self.var, e)))?;
        let pubkey = keypair.pubkey();
        self.keypair = Some(keypair);
        info!("connected env wallet {}", pubkey);
        Ok(pubkey)
    }

    fn public_key(&self) -> Option<Pubkey> {
        self.keypair.as_ref().map(Keypair::pubkey)
    }

    fn sign_message(&self, message: &[u8]) -> IeResult<Signature> {
        let keypair = self.keypair.as_ref().ok_or(IeError::WalletNotConnected)?;
        Ok(keypair.sign_message(message))
    }
}

/// Picks a wallet implementation by the name the user chose.
pub fn select_wallet(kind: &str, keypair_path: &str, secret_var: &str) -> IeResult<Box<dyn WalletProvider>> {
    match kind {
        "keypair" => Ok(Box::new(KeypairFileWallet::new(keypair_path))),
        "env" => Ok(Box::new(EnvWallet::new(secret_var))),
        other => Err(IeError::invalid(format!("unknown wallet kind: {}", other))),
    }
}

/// Signs `transaction` in the slot belonging to the wallet's key.
pub fn sign_versioned(transaction: &mut VersionedTransaction, wallet: &dyn WalletProvider) -> IeResult<()> {
    let pubkey = wallet.public_key().ok_or(IeError::WalletNotConnected)?;
    let required = transaction.message.header().num_required_signatures as usize;
    let index = transaction
        .message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|key| *key == pubkey)
        .ok_or_else(|| IeError::invalid(format!("{} is not a signer of this transaction", pubkey)))?;

    if transaction.signatures.len() < required {
        transaction.signatures.resize(required, Signature::default());
    }
    transaction.signatures[index] = wallet.sign_message(&transaction.message.serialize())?;
    Ok(())
}
