use super::{Progress, UploadFile, Uploader};
use abi::{ContentAddress, IeError, IeResult, UploadTarget};
use async_trait::async_trait;
use futures::stream;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;
use std::time::Duration;

pub const IPFS_GATEWAY: &str = "https://ipfs.io/ipfs";
const STREAM_CHUNK: usize = 64 * 1024;

/// Pinning services disagree on the field name.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(alias = "IpfsHash", alias = "cid")]
    hash: String,
}

/// Multipart upload to a content-addressed HTTP endpoint.
pub struct HttpUploader {
    http: reqwest::Client,
    endpoint: String,
    gateway: String,
    token: Option<String>,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpUploader {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            gateway: IPFS_GATEWAY.to_string(),
            token: None,
        }
    }

    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Streams the file in small pieces so progress tracks what the
    /// transport has actually pulled.
    fn streamed_part(file: &UploadFile, progress: &Progress) -> IeResult<Part> {
        let total = file.len();
        let pieces: Vec<Vec<u8>> = file.bytes.chunks(STREAM_CHUNK).map(<[u8]>::to_vec).collect();
        let progress = progress.clone();
        let mut pulled = 0u64;
        let body = stream::iter(pieces.into_iter().map(move |piece| {
            pulled += piece.len() as u64;
            progress.report(pulled, total);
            Ok::<_, std::io::Error>(piece)
        }));

        Part::stream_with_length(Body::wrap_stream(body), total)
            .file_name("upload")
            .mime_str(&file.content_type)
            .map_err(IeError::invalid)
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    fn target(&self) -> UploadTarget {
        UploadTarget::Http
    }

    async fn upload(&self, file: &UploadFile, progress: &Progress) -> IeResult<ContentAddress> {
        let form = Form::new().part("file", Self::streamed_part(file, progress)?);
        let mut request = self.http.post(&self.endpoint).multipart(form).timeout(Duration::from_secs(300));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(IeError::unavailable)?;
        let status = resp.status();
        let text = resp.text().await.map_err(IeError::unavailable)?;
        if !status.is_success() {
            return Err(IeError::DataUnavailable(format!("upload rejected ({}): {}", status, text)));
        }
        debug!("upload response: {}", text);

        let parsed: UploadResponse = serde_json::from_str(&text)
            .map_err(|e| IeError::DataUnavailable(format!("response has no content hash: {}", e)))?;
        if parsed.hash.is_empty() {
            return Err(IeError::unavailable("response has an empty content hash"));
        }

        progress.complete();
        info!("uploaded {} bytes as {}", file.len(), parsed.hash);
        Ok(ContentAddress {
            url: format!("{}/{}", self.gateway, parsed.hash),
            id: parsed.hash,
            target: UploadTarget::Http,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::sync::{Arc, Mutex};

    fn file(len: usize) -> UploadFile {
        UploadFile::new(vec![3u8; len], "video/mp4").unwrap()
    }

    #[tokio::test]
    async fn accepts_each_hash_field_name() {
        for body in [r#"{"hash":"Qm1"}"#, r#"{"IpfsHash":"Qm1"}"#, r#"{"cid":"Qm1"}"#] {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("POST", "/upload")
                .match_header("content-type", Matcher::Regex("^multipart/form-data".into()))
                .with_body(body)
                .create_async()
                .await;

            let uploader = HttpUploader::new(format!("{}/upload", server.url())).with_gateway("https://gw.test/ipfs/");
            let address = uploader.upload(&file(10), &Progress::silent()).await.unwrap();
            assert_eq!(address.id, "Qm1");
            assert_eq!(address.url, "https://gw.test/ipfs/Qm1");
            assert_eq!(address.target, UploadTarget::Http);
        }
    }

    #[tokio::test]
    async fn progress_reaches_100_after_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/upload")
            .match_header("authorization", "Bearer secret")
            .with_body(r#"{"IpfsHash":"QmDone"}"#)
            .create_async()
            .await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = Progress::new(move |p| sink.lock().unwrap().push(p));
        let uploader = HttpUploader::new(format!("{}/upload", server.url())).with_token(Some("secret".into()));
        uploader.upload(&file(STREAM_CHUNK * 3), &progress).await.unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen[..seen.len() - 1].iter().all(|p| *p <= 99));
    }

    #[tokio::test]
    async fn missing_hash_is_data_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/upload")
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let progress = Progress::silent();
        let uploader = HttpUploader::new(format!("{}/upload", server.url()));
        let err = uploader.upload(&file(10), &progress).await.unwrap_err();
        assert!(matches!(err, IeError::DataUnavailable(_)));
        assert!(progress.current() < 100);
    }

    #[tokio::test]
    async fn server_error_is_data_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/upload").with_status(502).create_async().await;

        let uploader = HttpUploader::new(format!("{}/upload", server.url()));
        let err = uploader.upload(&file(10), &Progress::silent()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
