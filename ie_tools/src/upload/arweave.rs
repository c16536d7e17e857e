use super::merkle::{prepare_chunks, sha256};
use super::{Progress, UploadFile, Uploader};
use abi::{ContentAddress, IeError, IeResult, UploadTarget};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::{debug, info};
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::{BigUint, RsaPrivateKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const ARWEAVE_GATEWAY: &str = "https://arweave.net";
/// 4096-bit keys only.
pub const MODULUS_BYTES: usize = 512;

fn b64(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn unb64(field: &str, value: &str) -> IeResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| IeError::invalid(format!("{} is not base64url: {}", field, e)))
}

#[derive(Deserialize)]
struct Jwk {
    n: String,
    e: String,
    d: String,
    p: String,
    q: String,
}

/// RSA key loaded from an Arweave JWK keyfile. Signs with RSA-PSS over
/// SHA-256.
pub struct ArweaveWallet {
    modulus: Vec<u8>,
    signing_key: BlindedSigningKey<Sha256>,
}

impl ArweaveWallet {
    pub fn from_jwk(json: &str) -> IeResult<Self> {
        let jwk: Jwk = serde_json::from_str(json).map_err(|e| IeError::invalid(format!("bad keyfile: {}", e)))?;
        let modulus = unb64("n", &jwk.n)?;
        if modulus.len() != MODULUS_BYTES {
            return Err(IeError::invalid(format!(
                "keyfile modulus is {} bytes, expected {}",
                modulus.len(),
                MODULUS_BYTES
            )));
        }
        let component = |field: &str, value: &str| unb64(field, value).map(|bytes| BigUint::from_bytes_be(&bytes));
        let key = RsaPrivateKey::from_components(
            BigUint::from_bytes_be(&modulus),
            component("e", &jwk.e)?,
            component("d", &jwk.d)?,
            vec![component("p", &jwk.p)?, component("q", &jwk.q)?],
        )
        .map_err(|e| IeError::invalid(format!("bad keyfile: {}", e)))?;
        key.validate().map_err(|e| IeError::invalid(format!("bad keyfile: {}", e)))?;

        Ok(ArweaveWallet {
            modulus,
            signing_key: BlindedSigningKey::<Sha256>::new(key),
        })
    }

    pub fn from_file(path: &Path) -> IeResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| IeError::invalid(format!("{}: {}", path.display(), e)))?;
        ArweaveWallet::from_jwk(&json)
    }

    /// The modulus, base64url encoded. Goes in the transaction's `owner`.
    pub fn owner(&self) -> String {
        b64(&self.modulus)
    }

    pub fn address(&self) -> String {
        b64(sha256(&[self.modulus.as_slice()]))
    }

    pub fn sign(&self, message: &[u8]) -> IeResult<Vec<u8>> {
        let signature = self
            .signing_key
            .try_sign_with_rng(&mut rand::thread_rng(), message)
            .map_err(|e| IeError::invalid(format!("signing failed: {}", e)))?;
        Ok(signature.to_vec())
    }
}

/// Input to `deep_hash`: raw bytes or a nested list of them.
pub enum DeepHashItem {
    Blob(Vec<u8>),
    List(Vec<DeepHashItem>),
}

/// SHA-384 hash of a nested structure. Each node is tagged with its kind and
/// length so that lists and blobs with the same bytes hash differently.
pub fn deep_hash(item: &DeepHashItem) -> Vec<u8> {
    match item {
        DeepHashItem::Blob(data) => {
            let tag = Sha384::digest(format!("blob{}", data.len()));
            let mut hasher = Sha384::new();
            hasher.update(tag);
            hasher.update(Sha384::digest(data));
            hasher.finalize().to_vec()
        }
        DeepHashItem::List(items) => items.iter().fold(
            Sha384::digest(format!("list{}", items.len())).to_vec(),
            |acc, child| {
                let mut hasher = Sha384::new();
                hasher.update(&acc);
                hasher.update(deep_hash(child));
                hasher.finalize().to_vec()
            },
        ),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// Format 2 transaction header. Binary fields are base64url, amounts are
/// decimal strings in winston.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub format: u8,
    pub id: String,
    pub last_tx: String,
    pub owner: String,
    pub tags: Vec<Tag>,
    pub target: String,
    pub quantity: String,
    pub data: String,
    pub data_size: String,
    pub data_root: String,
    pub reward: String,
    pub signature: String,
}

impl Transaction {
    /// The message the owner signs.
    pub fn signature_data(&self) -> IeResult<Vec<u8>> {
        let blob = |bytes: Vec<u8>| DeepHashItem::Blob(bytes);
        let text = |value: &str| DeepHashItem::Blob(value.as_bytes().to_vec());
        let tags = self
            .tags
            .iter()
            .map(|tag| {
                Ok(DeepHashItem::List(vec![
                    blob(unb64("tag name", &tag.name)?),
                    blob(unb64("tag value", &tag.value)?),
                ]))
            })
            .collect::<IeResult<Vec<_>>>()?;

        Ok(deep_hash(&DeepHashItem::List(vec![
            text(&self.format.to_string()),
            blob(unb64("owner", &self.owner)?),
            blob(unb64("target", &self.target)?),
            text(&self.quantity),
            text(&self.reward),
            blob(unb64("last_tx", &self.last_tx)?),
            DeepHashItem::List(tags),
            text(&self.data_size),
            blob(unb64("data_root", &self.data_root)?),
        ])))
    }

    /// Signs the header in place. The id is the SHA-256 of the signature.
    pub fn sign(&mut self, wallet: &ArweaveWallet) -> IeResult<()> {
        let signature = wallet.sign(&self.signature_data()?)?;
        self.id = b64(sha256(&[signature.as_slice()]));
        self.signature = b64(signature);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ChunkUpload<'a> {
    data_root: &'a str,
    data_size: String,
    data_path: String,
    offset: String,
    chunk: String,
}

/// Permanent storage upload as a format 2 transaction: the signed header is
/// posted first, then each chunk with its Merkle proof.
pub struct ArweaveUploader {
    http: reqwest::Client,
    gateway: String,
    wallet: Arc<ArweaveWallet>,
}

impl ArweaveUploader {
    pub fn new(gateway: impl Into<String>, wallet: Arc<ArweaveWallet>) -> Self {
        ArweaveUploader {
            http: reqwest::Client::new(),
            gateway: gateway.into().trim_end_matches('/').to_string(),
            wallet,
        }
    }

    async fn get_text(&self, path: &str) -> IeResult<String> {
        let resp = self
            .http
            .get(format!("{}/{}", self.gateway, path))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(IeError::unavailable)?;
        let status = resp.status();
        let text = resp.text().await.map_err(IeError::unavailable)?;
        if !status.is_success() {
            return Err(IeError::DataUnavailable(format!("gateway /{} ({}): {}", path, status, text)));
        }
        Ok(text.trim().to_string())
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> IeResult<()> {
        let resp = self
            .http
            .post(format!("{}/{}", self.gateway, path))
            .json(body)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(IeError::unavailable)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(IeError::DataUnavailable(format!("gateway rejected /{} ({}): {}", path, status, text)));
        }
        Ok(())
    }

    async fn confirm(&self, id: &str) -> IeResult<()> {
        let resp = self
            .http
            .get(format!("{}/tx/{}/status", self.gateway, id))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(IeError::unavailable)?;
        if !resp.status().is_success() {
            return Err(IeError::DataUnavailable(format!(
                "gateway has no record of {} ({})",
                id,
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Uploader for ArweaveUploader {
    fn target(&self) -> UploadTarget {
        UploadTarget::Arweave
    }

    async fn upload(&self, file: &UploadFile, progress: &Progress) -> IeResult<ContentAddress> {
        let prepared = prepare_chunks(&file.bytes);
        let data_root = b64(prepared.data_root);
        let data_size = file.len().to_string();

        let last_tx = self.get_text("tx_anchor").await?;
        let reward = self.get_text(&format!("price/{}", data_size)).await?;
        if reward.is_empty() || !reward.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IeError::DataUnavailable(format!("gateway returned a bad price: {:?}", reward)));
        }

        let mut transaction = Transaction {
            format: 2,
            id: String::new(),
            last_tx,
            owner: self.wallet.owner(),
            tags: vec![Tag {
                name: b64("Content-Type"),
                value: b64(&file.content_type),
            }],
            target: String::new(),
            quantity: "0".to_string(),
            data: String::new(),
            data_size: data_size.clone(),
            data_root: data_root.clone(),
            reward,
            signature: String::new(),
        };
        transaction.sign(&self.wallet)?;
        self.post("tx", &transaction).await?;
        debug!("posted transaction {} from {}", transaction.id, self.wallet.address());

        for (chunk, proof) in prepared.chunks.iter().zip(&prepared.proofs) {
            let upload = ChunkUpload {
                data_root: &data_root,
                data_size: data_size.clone(),
                data_path: b64(&proof.proof),
                offset: proof.offset.to_string(),
                chunk: b64(&file.bytes[chunk.min_byte_range..chunk.max_byte_range]),
            };
            self.post("chunk", &upload).await?;
            progress.report(chunk.max_byte_range as u64, file.len());
        }

        self.confirm(&transaction.id).await?;
        progress.complete();
        info!("stored {} bytes as {}", file.len(), transaction.id);
        Ok(ContentAddress {
            url: format!("{}/{}", self.gateway, transaction.id),
            id: transaction.id,
            target: UploadTarget::Arweave,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::merkle::tests::walk_proof;
    use crate::upload::merkle::MAX_CHUNK_SIZE;
    use mockito::Matcher;
    use rsa::pss::{Signature, VerifyingKey};
    use rsa::signature::Verifier;
    use rsa::RsaPublicKey;
    use serde_json::Value;
    use std::sync::Mutex;

    const KEYFILE: &str = include_str!("testdata/arweave_wallet.json");
    const ANCHOR: &str = "hKMMPNh_emBf8v_at1tFzNYACisyMQNcKzeeE1QE9p8PbDTUW2FpLC5nREJoxT2p";

    fn wallet() -> Arc<ArweaveWallet> {
        Arc::new(ArweaveWallet::from_jwk(KEYFILE).unwrap())
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn verify(transaction: &Transaction) {
        let owner = unb64("owner", &transaction.owner).unwrap();
        let public_key = RsaPublicKey::new(BigUint::from_bytes_be(&owner), BigUint::from(65537u32)).unwrap();
        let signature_bytes = unb64("signature", &transaction.signature).unwrap();
        let signature = Signature::try_from(signature_bytes.as_slice()).unwrap();
        VerifyingKey::<Sha256>::new(public_key)
            .verify(&transaction.signature_data().unwrap(), &signature)
            .unwrap();
        assert_eq!(transaction.id, b64(sha256(&[signature_bytes.as_slice()])));
    }

    fn capture(bodies: &Arc<Mutex<Vec<Value>>>) -> impl Fn(&mockito::Request) -> Vec<u8> + Send + Sync + 'static {
        let bodies = bodies.clone();
        move |request: &mockito::Request| {
            let body = request.body().unwrap();
            bodies.lock().unwrap().push(serde_json::from_slice(body).unwrap());
            Vec::new()
        }
    }

    #[test]
    fn deep_hash_matches_known_value() {
        let item = DeepHashItem::List(vec![
            DeepHashItem::Blob(b"2".to_vec()),
            DeepHashItem::Blob(b"abc".to_vec()),
            DeepHashItem::List(vec![DeepHashItem::List(vec![
                DeepHashItem::Blob(b"Content-Type".to_vec()),
                DeepHashItem::Blob(b"image/png".to_vec()),
            ])]),
            DeepHashItem::Blob(Vec::new()),
        ]);
        assert_eq!(
            hex(&deep_hash(&item)),
            "9b463696372f79dea5e6d2975840475fb6b116bf86b2e1416ef59cf5fc57b3b7f1eb367b2a60d568c6b3d19059fefd91"
        );
    }

    #[test]
    fn keyfile_gives_full_size_owner() {
        let wallet = wallet();
        assert_eq!(wallet.owner().len(), 683);
        assert_eq!(wallet.address().len(), 43);

        let mut jwk: Value = serde_json::from_str(KEYFILE).unwrap();
        jwk["n"] = Value::String(b64([1u8; 32]));
        assert!(matches!(
            ArweaveWallet::from_jwk(&jwk.to_string()),
            Err(IeError::ValidationFailure(_))
        ));
        assert!(ArweaveWallet::from_jwk("{}").is_err());
    }

    #[tokio::test]
    async fn posts_signed_header_then_proven_chunks() {
        let file = UploadFile::new((0..MAX_CHUNK_SIZE * 2 + 100).map(|i| (i % 253) as u8).collect(), "image/png").unwrap();
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/tx_anchor").with_body(ANCHOR).create_async().await;
        server
            .mock("GET", format!("/price/{}", file.len()).as_str())
            .with_body("123456789")
            .create_async()
            .await;

        let headers = Arc::new(Mutex::new(Vec::new()));
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let tx = server
            .mock("POST", "/tx")
            .with_body_from_request(capture(&headers))
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/chunk")
            .with_body_from_request(capture(&chunks))
            .expect(3)
            .create_async()
            .await;
        let status = server
            .mock("GET", Matcher::Regex(r"^/tx/[A-Za-z0-9_-]{43}/status$".into()))
            .with_status(202)
            .create_async()
            .await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = Progress::new(move |p| sink.lock().unwrap().push(p));
        let address = ArweaveUploader::new(server.url(), wallet())
            .upload(&file, &progress)
            .await
            .unwrap();
        tx.assert_async().await;
        status.assert_async().await;

        let header: Transaction = serde_json::from_value(headers.lock().unwrap()[0].clone()).unwrap();
        assert_eq!(header.format, 2);
        assert_eq!(header.owner.len(), 683);
        assert_eq!(header.last_tx, ANCHOR);
        assert_eq!(header.reward, "123456789");
        assert_eq!((header.quantity.as_str(), header.target.as_str()), ("0", ""));
        assert_eq!(header.data_size, file.len().to_string());
        assert_eq!(header.data_root, b64(prepare_chunks(&file.bytes).data_root));
        assert_eq!(unb64("tag", &header.tags[0].value).unwrap(), b"image/png");
        verify(&header);
        assert_eq!(address.id, header.id);
        assert_eq!(address.url, format!("{}/{}", server.url(), header.id));

        let root: [u8; 32] = unb64("data_root", &header.data_root).unwrap().try_into().unwrap();
        let mut covered = 0;
        for chunk in chunks.lock().unwrap().iter() {
            let offset: usize = chunk["offset"].as_str().unwrap().parse().unwrap();
            let path = unb64("data_path", chunk["data_path"].as_str().unwrap()).unwrap();
            let data = unb64("chunk", chunk["chunk"].as_str().unwrap()).unwrap();
            let (data_hash, left, right) = walk_proof(root, offset, file.bytes.len(), &path).unwrap();
            assert_eq!(data_hash, sha256(&[data.as_slice()]));
            assert_eq!(&file.bytes[left..right], data.as_slice());
            assert_eq!(chunk["data_root"], Value::String(header.data_root.clone()));
            covered += data.len();
        }
        assert_eq!(covered, file.bytes.len());

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test]
    async fn rejected_chunk_never_reaches_100() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/tx_anchor").with_body(ANCHOR).create_async().await;
        server.mock("GET", "/price/1024").with_body("1000").create_async().await;
        server.mock("POST", "/tx").create_async().await;
        server.mock("POST", "/chunk").with_status(500).create_async().await;

        let progress = Progress::silent();
        let file = UploadFile::new(vec![1u8; 1024], "image/gif").unwrap();
        let err = ArweaveUploader::new(server.url(), wallet())
            .upload(&file, &progress)
            .await
            .unwrap_err();

        assert!(matches!(err, IeError::DataUnavailable(_)));
        assert!(progress.current() < 100);
    }

    #[tokio::test]
    async fn bad_price_stops_before_posting() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/tx_anchor").with_body(ANCHOR).create_async().await;
        server.mock("GET", "/price/8").with_body("<html>").create_async().await;
        let tx = server.mock("POST", "/tx").expect(0).create_async().await;

        let file = UploadFile::new(vec![1u8; 8], "image/png").unwrap();
        let err = ArweaveUploader::new(server.url(), wallet())
            .upload(&file, &Progress::silent())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        tx.assert_async().await;
    }
}
