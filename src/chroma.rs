// Chroma key: pixels whose color falls inside a HSV range are replaced by a background image.
// Visual expectation: hold a green sheet behind you, enable the effect, and the sheet
// shows the background picture instead while you stay in front of it.

use crate::error::{Error, Result};
use crate::types::{ColorRange, Frame, Mask};
use image::Rgb;
use image::imageops::{self, FilterType};

/// Convert one RGB pixel to 8-bit HSV (hue 0..=179, sat/val 0..=255).
pub fn rgb_to_hsv(px: Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = px.0;
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = max - min;

    let v = max;
    let s = if max > 0.0 { 255.0 * diff / max } else { 0.0 };

    let mut h = if diff == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / diff
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    // Hue is stored as degrees / 2 so it fits in a byte; 360° wraps to 0.
    let mut h8 = (h / 2.0).round() as u32;
    if h8 >= 180 {
        h8 = 0;
    }
    [h8 as u8, s.round().clamp(0.0, 255.0) as u8, v as u8]
}

/// Mark every pixel of `frame` whose HSV value falls inside `range` (inclusive).
pub fn key_mask(frame: &Frame, range: &ColorRange) -> Mask {
    let (w, h) = frame.dimensions();
    let mut mask = Mask::new(w, h);
    for (i, px) in frame.pixels().enumerate() {
        mask.keyed[i] = range.contains(rgb_to_hsv(*px));
    }
    mask
}

/// Keep `frame` where the mask is set, black everywhere else.
pub fn restrict(frame: &Frame, mask: &Mask) -> Result<Frame> {
    if frame.dimensions() != (mask.width, mask.height) {
        return Err(Error::Dimensions("restrict: mask does not match frame".into()));
    }
    let mut out = Frame::new(mask.width, mask.height);
    for ((dst, src), keep) in out.pixels_mut().zip(frame.pixels()).zip(&mask.keyed) {
        if *keep {
            *dst = *src;
        }
    }
    Ok(out)
}

/// Per-channel saturating sum of two same-sized frames.
pub fn add_saturating(a: &Frame, b: &Frame) -> Result<Frame> {
    if a.dimensions() != b.dimensions() {
        return Err(Error::Dimensions("add: frames differ in size".into()));
    }
    let mut out = a.clone();
    for (o, p) in out.pixels_mut().zip(b.pixels()) {
        for c in 0..3 {
            o[c] = o[c].saturating_add(p[c]);
        }
    }
    Ok(out)
}

/// Resize `background` to `width x height` unless it already matches.
pub fn fit_background(background: &Frame, width: u32, height: u32) -> Frame {
    if background.dimensions() == (width, height) {
        return background.clone();
    }
    imageops::resize(background, width, height, FilterType::Triangle)
}

/// Replace keyed pixels of `frame` by the matching pixels of `background`.
/// Without a background the frame passes through unchanged.
pub fn composite(frame: &Frame, background: Option<&Frame>, range: &ColorRange) -> Result<Frame> {
    let Some(background) = background else {
        return Ok(frame.clone());
    };
    let (w, h) = frame.dimensions();
    let fitted = fit_background(background, w, h);
    composite_fitted(frame, &fitted, range)
}

// `background` must already have the frame's dimensions.
fn composite_fitted(frame: &Frame, background: &Frame, range: &ColorRange) -> Result<Frame> {
    let mask = key_mask(frame, range);
    let inverse = mask.complement();

    let foreground = restrict(frame, &inverse)?;
    let background_part = restrict(background, &mask)?;
    add_saturating(&foreground, &background_part)
}

/// Owns the key range and the background picture for one video session.
/// The resized background is cached until the live frame size changes.
pub struct ChromaCompositor {
    range: ColorRange,
    background: Option<Frame>,
    fitted: Option<Frame>,
}

impl ChromaCompositor {
    pub fn new(range: ColorRange) -> Self {
        Self { range, background: None, fitted: None }
    }

    pub fn range(&self) -> ColorRange {
        self.range
    }

    pub fn set_range(&mut self, range: ColorRange) {
        self.range = range;
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    /// Replace the background; the next frame resizes it to the live size.
    pub fn set_background(&mut self, background: Frame) {
        self.background = Some(background);
        self.fitted = None;
    }

    pub fn clear_background(&mut self) {
        self.background = None;
        self.fitted = None;
    }

    /// Install a solid-color background when none was chosen yet.
    pub fn ensure_background(&mut self, width: u32, height: u32, color: [u8; 3]) {
        if self.background.is_none() {
            self.set_background(Frame::from_pixel(width, height, Rgb(color)));
        }
    }

    /// Composite one live frame.
    pub fn apply(&mut self, frame: &Frame) -> Result<Frame> {
        let Some(background) = &self.background else {
            return Ok(frame.clone());
        };
        let (w, h) = frame.dimensions();
        let stale = self.fitted.as_ref().map_or(true, |f| f.dimensions() != (w, h));
        if stale {
            self.fitted = Some(fit_background(background, w, h));
        }
        match &self.fitted {
            Some(fitted) => composite_fitted(frame, fitted, &self.range),
            None => Ok(frame.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

    fn scene() -> Frame {
        // Gradient that never hits the green key, with a 100x100 pure-green square.
        let mut frame = Frame::from_fn(640, 480, |x, y| Rgb([(x % 256) as u8, 0, (y % 128) as u8 + 64]));
        for y in 200..300 {
            for x in 100..200 {
                frame.put_pixel(x, y, GREEN);
            }
        }
        frame
    }

    #[test]
    fn hsv_matches_8bit_convention() {
        assert_eq!(rgb_to_hsv(GREEN), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(BLUE), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(Rgb([255, 0, 0])), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(Rgb([128, 128, 128])), [0, 0, 128]);
        assert_eq!(rgb_to_hsv(Rgb([0, 0, 0])), [0, 0, 0]);
    }

    #[test]
    fn restrictions_to_mask_and_complement_rebuild_the_frame() {
        let frame = scene();
        let mask = key_mask(&frame, &ColorRange::default());
        let a = restrict(&frame, &mask).unwrap();
        let b = restrict(&frame, &mask.complement()).unwrap();
        assert_eq!(add_saturating(&a, &b).unwrap(), frame);
    }

    #[test]
    fn missing_background_passes_frame_through() {
        let frame = scene();
        assert_eq!(composite(&frame, None, &ColorRange::default()).unwrap(), frame);

        let mut fx = ChromaCompositor::new(ColorRange::default());
        assert_eq!(fx.apply(&frame).unwrap(), frame);
    }

    #[test]
    fn green_square_becomes_blue_background() {
        let frame = scene();
        let background = Frame::from_pixel(640, 480, BLUE);
        let range = ColorRange::new([35, 50, 50], [85, 255, 255]);
        let out = composite(&frame, Some(&background), &range).unwrap();

        for y in 200..300 {
            for x in 100..200 {
                assert_eq!(*out.get_pixel(x, y), BLUE);
            }
        }
        for (x, y) in [(0, 0), (99, 250), (200, 250), (150, 199), (639, 479)] {
            assert_eq!(out.get_pixel(x, y), frame.get_pixel(x, y));
        }
    }

    #[test]
    fn background_is_resized_to_the_frame() {
        let frame = Frame::from_pixel(64, 48, GREEN);
        let small = Frame::from_pixel(8, 6, BLUE);
        let mut fx = ChromaCompositor::new(ColorRange::default());
        fx.set_background(small);
        let out = fx.apply(&frame).unwrap();
        assert_eq!(out.dimensions(), (64, 48));
        assert!(out.pixels().all(|p| *p == BLUE));
    }

    #[test]
    fn addition_saturates_instead_of_wrapping() {
        let a = Frame::from_pixel(1, 1, Rgb([200, 10, 255]));
        let b = Frame::from_pixel(1, 1, Rgb([100, 10, 1]));
        assert_eq!(*add_saturating(&a, &b).unwrap().get_pixel(0, 0), Rgb([255, 20, 255]));
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let frame = Frame::new(4, 4);
        assert!(matches!(restrict(&frame, &Mask::new(3, 4)), Err(Error::Dimensions(_))));
        assert!(add_saturating(&frame, &Frame::new(4, 5)).is_err());
    }

    #[test]
    fn default_background_is_only_created_once() {
        let mut fx = ChromaCompositor::new(ColorRange::default());
        fx.ensure_background(4, 4, [0, 0, 255]);
        fx.ensure_background(4, 4, [255, 0, 0]);
        let out = fx.apply(&Frame::from_pixel(4, 4, GREEN)).unwrap();
        assert_eq!(*out.get_pixel(0, 0), BLUE);
    }
}
