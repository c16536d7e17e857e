pub mod arweave;
pub mod http;
pub mod merkle;

pub use arweave::{ArweaveUploader, ArweaveWallet};
pub use http::HttpUploader;

use crate::media::{validate_media, validate_path};
use abi::{ContentAddress, IeError, IeResult, UploadTarget};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// A validated file ready to be sent.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl UploadFile {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> IeResult<Self> {
        let content_type = content_type.into();
        validate_media(bytes.len() as u64, &content_type)?;
        Ok(UploadFile { bytes, content_type })
    }

    /// Checks type and size from the path and metadata, then reads the file.
    pub fn from_path(path: &Path) -> IeResult<Self> {
        let (_, content_type) = validate_path(path)?;
        let bytes = std::fs::read(path).map_err(|e| IeError::invalid(format!("{}: {}", path.display(), e)))?;
        UploadFile::new(bytes, content_type)
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

struct ProgressInner {
    last: AtomicU8,
    callback: Option<Box<dyn Fn(u8) + Send + Sync>>,
}

/// Upload progress in percent. Never goes backwards, and stays at 99 or
/// below until `complete` is called.
#[derive(Clone)]
pub struct Progress {
    inner: Arc<ProgressInner>,
}

impl Progress {
    pub fn new(callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Progress {
            inner: Arc::new(ProgressInner {
                last: AtomicU8::new(0),
                callback: Some(Box::new(callback)),
            }),
        }
    }

    pub fn silent() -> Self {
        Progress {
            inner: Arc::new(ProgressInner {
                last: AtomicU8::new(0),
                callback: None,
            }),
        }
    }

    pub fn report(&self, done: u64, total: u64) {
        let percent = if total == 0 { 0 } else { (done.min(total) * 100 / total).min(99) };
        self.advance(percent as u8);
    }

    pub fn complete(&self) {
        self.advance(100);
    }

    pub fn current(&self) -> u8 {
        self.inner.last.load(Ordering::SeqCst)
    }

    fn advance(&self, percent: u8) {
        let previous = self.inner.last.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            if let Some(callback) = &self.inner.callback {
                callback(percent);
            }
        }
    }
}

#[async_trait]
pub trait Uploader: Send + Sync {
    fn target(&self) -> UploadTarget;

    async fn upload(&self, file: &UploadFile, progress: &Progress) -> IeResult<ContentAddress>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn progress_is_monotonic_and_capped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = Progress::new(move |p| sink.lock().unwrap().push(p));

        progress.report(50, 100);
        progress.report(20, 100);
        progress.report(100, 100);
        progress.report(500, 100);
        assert_eq!(progress.current(), 99);

        progress.complete();
        assert_eq!(*seen.lock().unwrap(), vec![50, 99, 100]);
    }

    #[test]
    fn upload_file_is_validated() {
        assert!(UploadFile::new(vec![1, 2, 3], "image/png").is_ok());
        assert!(matches!(UploadFile::new(vec![1], "text/html"), Err(IeError::ValidationFailure(_))));
        assert!(UploadFile::new(vec![], "image/png").is_err());
        assert!(UploadFile::from_path(Path::new("/definitely/missing.png")).is_err());
    }
}
