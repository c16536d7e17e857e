use super::filter::{apply_filter, FilterParams, PixelFrame};
use abi::{IeError, IeResult};
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use log::{debug, warn};
use std::collections::VecDeque;
use std::io::Cursor;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub trait FrameSource: Send + 'static {
    /// `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<IeResult<PixelFrame>>;
}

/// A single decoded image.
pub struct StillImage(Option<PixelFrame>);

impl StillImage {
    pub fn new(frame: PixelFrame) -> Self {
        StillImage(Some(frame))
    }

    pub fn decode(bytes: &[u8]) -> IeResult<Self> {
        let image = image::load_from_memory(bytes).map_err(IeError::invalid)?;
        Ok(StillImage::new(image.to_rgba8().into()))
    }
}

impl FrameSource for StillImage {
    fn next_frame(&mut self) -> Option<IeResult<PixelFrame>> {
        self.0.take().map(Ok)
    }
}

/// Pre-decoded frames, played once or looped until cancelled.
pub struct FrameSequence {
    frames: VecDeque<PixelFrame>,
    looping: bool,
}

impl FrameSequence {
    pub fn new(frames: Vec<PixelFrame>) -> Self {
        FrameSequence {
            frames: frames.into(),
            looping: false,
        }
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn decode_gif(bytes: &[u8]) -> IeResult<Self> {
        let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(IeError::invalid)?;
        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(IeError::invalid)?
            .into_iter()
            .map(|frame| PixelFrame::from(frame.into_buffer()))
            .collect();
        Ok(FrameSequence::new(frames))
    }
}

impl FrameSource for FrameSequence {
    fn next_frame(&mut self) -> Option<IeResult<PixelFrame>> {
        let frame = self.frames.pop_front()?;
        if self.looping {
            self.frames.push_back(frame.clone());
        }
        Some(Ok(frame))
    }
}

/// Filters the first frame only, for a quick preview.
pub fn preview_first_frame(source: &mut dyn FrameSource, params: &FilterParams) -> IeResult<PixelFrame> {
    let frame = source
        .next_frame()
        .ok_or_else(|| IeError::invalid("source has no frames"))??;
    Ok(apply_filter(&frame, params))
}

/// A running render loop. Dropping the handle cancels it.
pub struct RenderHandle {
    frames: mpsc::Receiver<PixelFrame>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<usize>,
}

impl RenderHandle {
    pub async fn next(&mut self) -> Option<PixelFrame> {
        self.frames.recv().await
    }

    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Waits for the loop to stop and returns how many frames it rendered.
    pub async fn finish(mut self) -> usize {
        // Unblock a loop waiting on a full channel.
        self.frames.close();
        (&mut self.task).await.unwrap_or(0)
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

pub struct RenderLoop;

impl RenderLoop {
    /// Filters frames from `source` on a background task, yielding between
    /// frames, until the source runs dry or the handle is cancelled.
    pub fn spawn<S: FrameSource>(mut source: S, params: FilterParams) -> RenderHandle {
        let (tx, rx) = mpsc::channel(2);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut rendered = 0;
            loop {
                if *cancel_rx.borrow() {
                    break;
                }
                let frame = match source.next_frame() {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        warn!("skipping frame: {}", e);
                        // a source that keeps failing must not starve the runtime
                        tokio::task::yield_now().await;
                        continue;
                    }
                    None => break,
                };
                let filtered = apply_filter(&frame, &params);
                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    sent = tx.send(filtered) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
                rendered += 1;
                tokio::task::yield_now().await;
            }
            debug!("render loop stopped after {} frames", rendered);
            rendered
        });

        RenderHandle {
            frames: rx,
            cancel: cancel_tx,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Corrupt(Arc<AtomicUsize>);

    impl FrameSource for Corrupt {
        fn next_frame(&mut self) -> Option<IeResult<PixelFrame>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Some(Err(IeError::invalid("corrupt frame")))
        }
    }

    fn frames(n: u8) -> Vec<PixelFrame> {
        (0..n).map(|i| PixelFrame::filled(2, 2, [i, i, i, 255])).collect()
    }

    fn params() -> FilterParams {
        FilterParams {
            noise_amplitude: 0,
            ..FilterParams::default()
        }
    }

    #[tokio::test]
    async fn finite_source_runs_to_exhaustion() {
        let mut handle = RenderLoop::spawn(FrameSequence::new(frames(3)), params());
        let mut received = 0;
        while handle.next().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 3);
        assert_eq!(handle.finish().await, 3);
    }

    #[tokio::test]
    async fn still_image_yields_one_frame() {
        let mut handle = RenderLoop::spawn(StillImage::new(PixelFrame::filled(1, 1, [9, 9, 9, 255])), params());
        assert!(handle.next().await.is_some());
        assert!(handle.next().await.is_none());
    }

    #[tokio::test]
    async fn looping_source_stops_on_cancel() {
        let mut handle = RenderLoop::spawn(FrameSequence::new(frames(2)).looping(), params());
        for _ in 0..5 {
            assert!(handle.next().await.is_some());
        }
        handle.cancel();
        let rendered = handle.finish().await;
        assert!(rendered >= 5);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failing_source_can_still_be_cancelled() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let handle = RenderLoop::spawn(Corrupt(attempts.clone()), params());
        while attempts.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }
        handle.cancel();
        assert_eq!(handle.finish().await, 0);
    }

    #[test]
    fn preview_takes_first_frame_only() {
        let mut source = FrameSequence::new(frames(3));
        let preview = preview_first_frame(&mut source, &params()).unwrap();
        assert_eq!(preview.width(), 2);
        assert!(matches!(source.next_frame(), Some(Ok(f)) if f.pixel(0, 0)[3] == 255 && f.pixel(0, 0)[1] == 1));
    }

    #[test]
    fn empty_source_has_no_preview() {
        let mut source = FrameSequence::new(vec![]);
        assert!(preview_first_frame(&mut source, &params()).is_err());
    }
}
