pub mod codec;
pub mod filter;
pub mod render_loop;
pub mod validate;

pub use codec::{load_frames, save_frames};
pub use filter::{apply_filter, FilterParams, PixelFrame, Watermark};
pub use render_loop::{preview_first_frame, FrameSequence, FrameSource, RenderHandle, RenderLoop, StillImage};
pub use validate::{content_type_for_path, validate_media, validate_path, MediaKind, MAX_MEDIA_BYTES};
