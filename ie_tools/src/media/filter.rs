use abi::{IeError, IeResult};
use image::RgbaImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tightly packed RGBA8 pixels, row major. The buffer always matches the
/// dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

fn buffer_len(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)?.checked_mul(4)
}

impl PixelFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> IeResult<Self> {
        if buffer_len(width, height) != Some(data.len()) {
            return Err(IeError::invalid(format!(
                "{} bytes do not make a {}x{} RGBA frame",
                data.len(),
                width,
                height
            )));
        }
        Ok(PixelFrame { width, height, data })
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(buffer_len(width, height).unwrap_or(0))
            .collect();
        PixelFrame { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}

impl From<RgbaImage> for PixelFrame {
    fn from(image: RgbaImage) -> Self {
        // RgbaImage enforces the same buffer length
        PixelFrame {
            width: image.width(),
            height: image.height(),
            data: image.into_raw(),
        }
    }
}

impl TryFrom<PixelFrame> for RgbaImage {
    type Error = IeError;

    fn try_from(frame: PixelFrame) -> IeResult<Self> {
        RgbaImage::from_raw(frame.width, frame.height, frame.data)
            .ok_or_else(|| IeError::invalid("frame buffer does not match its dimensions"))
    }
}

#[derive(Debug, Clone)]
pub struct Watermark {
    pub frame: PixelFrame,
    /// 0.0 hides the mark, 1.0 uses its own alpha unchanged.
    pub opacity: f32,
    pub margin: u32,
}

#[derive(Debug, Clone)]
pub struct FilterParams {
    pub channel_scale: [f32; 3],
    /// Every `scanline_period`-th row is darkened; 0 disables.
    pub scanline_period: u32,
    pub scanline_factor: f32,
    /// How much red is pulled from the left neighbor and blue from the right.
    pub bleed: f32,
    pub bleed_offset: u32,
    pub noise_amplitude: u8,
    pub seed: u64,
    pub watermark: Option<Watermark>,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            channel_scale: [1.1, 0.95, 1.05],
            scanline_period: 2,
            scanline_factor: 0.8,
            bleed: 0.35,
            bleed_offset: 2,
            noise_amplitude: 12,
            seed: 0x1e,
            watermark: None,
        }
    }
}

/// Applies the filter to one frame. The result depends only on the frame
/// and `params`; alpha is left untouched except under the watermark.
pub fn apply_filter(frame: &PixelFrame, params: &FilterParams) -> PixelFrame {
    let mut out = frame.clone();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let last_x = frame.width.saturating_sub(1);

    for y in 0..frame.height {
        let darken = params.scanline_period > 0 && y % params.scanline_period == 0;
        for x in 0..frame.width {
            let [r, g, b, _] = frame.pixel(x, y);
            let left = frame.pixel(x.saturating_sub(params.bleed_offset), y);
            let right = frame.pixel(x.saturating_add(params.bleed_offset).min(last_x), y);

            let mut rgb = [
                mix(r, left[0], params.bleed),
                g as f32,
                mix(b, right[2], params.bleed),
            ];
            for (channel, scale) in rgb.iter_mut().zip(params.channel_scale) {
                *channel *= scale;
                if darken {
                    *channel *= params.scanline_factor;
                }
            }
            if params.noise_amplitude > 0 {
                let amplitude = params.noise_amplitude as i32;
                let noise = rng.gen_range(-amplitude..=amplitude) as f32;
                for channel in rgb.iter_mut() {
                    *channel += noise;
                }
            }

            let i = out.offset(x, y);
            for (c, value) in rgb.iter().enumerate() {
                out.data[i + c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    if let Some(watermark) = &params.watermark {
        composite_watermark(&mut out, watermark);
    }
    out
}

fn mix(own: u8, neighbor: u8, amount: f32) -> f32 {
    own as f32 * (1.0 - amount) + neighbor as f32 * amount
}

/// Alpha-blends the mark into the bottom-right corner, clipped to the frame.
fn composite_watermark(frame: &mut PixelFrame, watermark: &Watermark) {
    let mark = &watermark.frame;
    let left = frame.width.saturating_sub(mark.width.saturating_add(watermark.margin));
    let top = frame.height.saturating_sub(mark.height.saturating_add(watermark.margin));

    for my in 0..mark.height {
        let y = top.saturating_add(my);
        if y >= frame.height {
            break;
        }
        for mx in 0..mark.width {
            let x = left.saturating_add(mx);
            if x >= frame.width {
                break;
            }
            let [mr, mg, mb, ma] = mark.pixel(mx, my);
            let alpha = ma as f32 / 255.0 * watermark.opacity.clamp(0.0, 1.0);
            let i = frame.offset(x, y);
            for (c, value) in [mr, mg, mb].into_iter().enumerate() {
                let base = frame.data[i + c] as f32;
                frame.data[i + c] = (value as f32 * alpha + base * (1.0 - alpha)).round() as u8;
            }
            let base_alpha = frame.data[i + 3] as f32 / 255.0;
            frame.data[i + 3] = ((alpha + base_alpha * (1.0 - alpha)) * 255.0).round() as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> FilterParams {
        FilterParams {
            channel_scale: [1.0, 1.0, 1.0],
            scanline_period: 0,
            scanline_factor: 1.0,
            bleed: 0.0,
            bleed_offset: 1,
            noise_amplitude: 0,
            seed: 7,
            watermark: None,
        }
    }

    fn gradient(width: u32, height: u32) -> PixelFrame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 20) as u8, (y * 20) as u8, 100, 200]);
            }
        }
        PixelFrame::new(width, height, data).unwrap()
    }

    #[test]
    fn identity_params_leave_frame_unchanged() {
        let frame = gradient(6, 4);
        assert_eq!(apply_filter(&frame, &plain()), frame);
    }

    #[test]
    fn same_seed_same_output() {
        let frame = gradient(8, 8);
        let params = FilterParams::default();
        assert_eq!(apply_filter(&frame, &params), apply_filter(&frame, &params));

        let other = FilterParams { seed: 99, ..FilterParams::default() };
        assert_ne!(apply_filter(&frame, &params), apply_filter(&frame, &other));
    }

    #[test]
    fn alpha_is_preserved() {
        let frame = gradient(5, 5);
        let out = apply_filter(&frame, &FilterParams::default());
        for y in 0..5 {
            for x in 0..5 {
                assert_eq!(out.pixel(x, y)[3], 200);
            }
        }
    }

    #[test]
    fn scanlines_darken_every_other_row() {
        let frame = PixelFrame::filled(3, 4, [100, 100, 100, 255]);
        let params = FilterParams { scanline_period: 2, scanline_factor: 0.5, ..plain() };
        let out = apply_filter(&frame, &params);
        assert_eq!(out.pixel(1, 0), [50, 50, 50, 255]);
        assert_eq!(out.pixel(1, 1), [100, 100, 100, 255]);
        assert_eq!(out.pixel(1, 2), [50, 50, 50, 255]);
    }

    #[test]
    fn channel_scaling_saturates() {
        let frame = PixelFrame::filled(2, 2, [200, 100, 50, 255]);
        let params = FilterParams { channel_scale: [2.0, 0.5, 1.0], ..plain() };
        assert_eq!(apply_filter(&frame, &params).pixel(0, 0), [255, 50, 50, 255]);
    }

    #[test]
    fn red_bleeds_from_the_left() {
        let frame = PixelFrame::new(3, 1, vec![200, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255]).unwrap();
        let params = FilterParams { bleed: 0.5, ..plain() };
        let out = apply_filter(&frame, &params);
        assert_eq!(out.pixel(1, 0)[0], 100);
        assert_eq!(out.pixel(2, 0)[0], 0);
    }

    #[test]
    fn noise_stays_within_amplitude() {
        let frame = PixelFrame::filled(10, 10, [128, 128, 128, 255]);
        let params = FilterParams { noise_amplitude: 5, ..plain() };
        let out = apply_filter(&frame, &params);
        assert!(out.data().chunks(4).all(|px| px[..3].iter().all(|c| (123..=133).contains(c))));
    }

    #[test]
    fn watermark_lands_bottom_right() {
        let frame = PixelFrame::filled(10, 10, [0, 0, 0, 255]);
        let params = FilterParams {
            watermark: Some(Watermark {
                frame: PixelFrame::filled(2, 2, [255, 255, 255, 255]),
                opacity: 1.0,
                margin: 1,
            }),
            ..plain()
        };
        let out = apply_filter(&frame, &params);
        assert_eq!(out.pixel(7, 7), [255, 255, 255, 255]);
        assert_eq!(out.pixel(8, 8), [255, 255, 255, 255]);
        assert_eq!(out.pixel(9, 9), [0, 0, 0, 255]);
        assert_eq!(out.pixel(6, 6), [0, 0, 0, 255]);
    }

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(PixelFrame::new(2, 2, vec![0; 15]).is_err());
        assert!(PixelFrame::new(u32::MAX, u32::MAX, vec![0; 4]).is_err());
    }

    #[test]
    fn extreme_offsets_clamp_instead_of_overflowing() {
        let frame = gradient(4, 3);
        let params = FilterParams {
            bleed: 0.5,
            bleed_offset: u32::MAX,
            watermark: Some(Watermark {
                frame: PixelFrame::filled(2, 2, [255, 255, 255, 255]),
                opacity: 1.0,
                margin: u32::MAX,
            }),
            ..plain()
        };
        let out = apply_filter(&frame, &params);
        assert_eq!((out.width(), out.height()), (4, 3));
        // both neighbors clamp to the frame edges
        assert_eq!(out.pixel(1, 0)[0], 10);
        assert_eq!(out.pixel(1, 0)[2], 100);
        // a margin wider than the frame pins the mark to the top-left
        assert_eq!(out.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(out.pixel(1, 1), [255, 255, 255, 255]);
        assert_eq!(out.pixel(2, 2)[3], 200);
    }
}
