use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

mod error;

pub use error::{IeError, IeResult};

/// A decoded token account holding a non-zero balance of the scanned mint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TokenAccountRecord {
    #[serde(with = "pubkey_str")]
    pub address: Pubkey,
    #[serde(with = "pubkey_str")]
    pub owner: Pubkey,
    #[serde(with = "pubkey_str")]
    pub mint: Pubkey,
    pub raw_amount: u64,
    pub ui_amount: f64,
}

/// Holders sorted by `raw_amount` descending, ties in scan order.
pub type HolderList = Vec<TokenAccountRecord>;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct MintInfo {
    pub decimals: u8,
    pub supply: u64,
    #[serde(with = "pubkey_str")]
    pub program_id: Pubkey,
}

/// A named group of addresses drawn as one entity on the bubble map.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Bundle {
    pub name: String,
    pub color: String,
    #[serde(with = "pubkey_vec_str")]
    pub addresses: Vec<Pubkey>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LeafNode {
    pub name: String,
    pub value: f64,
    #[serde(with = "pubkey_str")]
    pub owner: Pubkey,
}

impl LeafNode {
    pub fn from_record(record: &TokenAccountRecord) -> Self {
        LeafNode {
            name: record.owner.to_string(),
            value: record.ui_amount,
            owner: record.owner,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum HierarchyNode {
    Bundle {
        name: String,
        color: String,
        children: Vec<LeafNode>,
    },
    Leaf(LeafNode),
}

impl HierarchyNode {
    pub fn leaf_count(&self) -> usize {
        match self {
            HierarchyNode::Bundle { children, .. } => children.len(),
            HierarchyNode::Leaf(_) => 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Summary {
    pub holder_count: usize,
    pub total_supply: f64,
    pub team_percentage: f64,
    pub marketing_percentage: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DaysHeldEntry {
    #[serde(with = "pubkey_str")]
    pub owner: Pubkey,
    #[serde(with = "pubkey_str")]
    pub address: Pubkey,
    pub ui_amount: f64,
    pub first_seen: i64,
    pub days_held: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RankedRow<T> {
    pub rank: usize,
    #[serde(flatten)]
    pub row: T,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LeaderboardPage<T> {
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_rows: usize,
    pub rows: Vec<RankedRow<T>>,
}

/// Aggregator quote. `raw` is the untouched response, echoed back when
/// requesting the swap transaction.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Quote {
    pub in_amount: u64,
    pub out_amount: u64,
    pub other_amount_threshold: u64,
    pub price_impact_pct: f64,
    pub slippage_bps: u64,
    pub route: Vec<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    pub signature: String,
    pub block_time: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadTarget {
    Arweave,
    Http,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ContentAddress {
    pub id: String,
    pub url: String,
    pub target: UploadTarget,
}

pub mod pubkey_str {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(key: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&key.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(d)?;
        Pubkey::from_str(&s).map_err(de::Error::custom)
    }
}

pub mod pubkey_vec_str {
    use serde::{de, ser::SerializeSeq, Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(keys: &[Pubkey], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(keys.len()))?;
        for key in keys {
            seq.serialize_element(&key.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Pubkey>, D::Error> {
        Vec::<String>::deserialize(d)?
            .iter()
            .map(|s| Pubkey::from_str(s).map_err(de::Error::custom))
            .collect()
    }
}
