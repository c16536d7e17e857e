use super::filter::PixelFrame;
use super::render_loop::{FrameSequence, FrameSource, StillImage};
use super::validate::{validate_media, MediaKind};
use abi::{IeError, IeResult};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{DynamicImage, Frame, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Decodes validated bytes into frames. GIFs keep every frame, other images
/// become a single frame. Video needs a frame decoder this crate does not ship.
pub fn load_frames(bytes: &[u8], content_type: &str) -> IeResult<FrameSequence> {
    match validate_media(bytes.len() as u64, content_type)? {
        MediaKind::Video => Err(IeError::invalid(format!("cannot decode frames from {}", content_type))),
        MediaKind::Image if content_type.eq_ignore_ascii_case("image/gif") => FrameSequence::decode_gif(bytes),
        MediaKind::Image => {
            let mut still = StillImage::decode(bytes)?;
            let frame = still
                .next_frame()
                .ok_or_else(|| IeError::invalid("image has no pixels"))??;
            Ok(FrameSequence::new(vec![frame]))
        }
    }
}

/// Writes one frame in the format named by the extension, or several as an
/// endlessly looping GIF.
pub fn save_frames(path: &Path, frames: Vec<PixelFrame>) -> IeResult<()> {
    let mut frames = frames
        .into_iter()
        .map(RgbaImage::try_from)
        .collect::<IeResult<Vec<_>>>()?;
    match frames.len() {
        0 => Err(IeError::invalid("no frames to save")),
        1 => save_still(path, frames.remove(0)),
        _ => {
            let file = File::create(path).map_err(|e| IeError::invalid(format!("{}: {}", path.display(), e)))?;
            let mut encoder = GifEncoder::new(BufWriter::new(file));
            encoder.set_repeat(Repeat::Infinite).map_err(IeError::invalid)?;
            encoder
                .encode_frames(frames.into_iter().map(Frame::new))
                .map_err(IeError::invalid)
        }
    }
}

fn save_still(path: &Path, image: RgbaImage) -> IeResult<()> {
    let is_jpeg = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false);
    // JPEG has no alpha channel.
    let result = if is_jpeg {
        DynamicImage::ImageRgba8(image).to_rgb8().save(path)
    } else {
        image.save(path)
    };
    result.map_err(IeError::invalid)
}
