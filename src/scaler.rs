//! Bilinear frame resampling.
//!
//! Destination pixel `(x, y)` samples the source at
//! `(x * src_w / dst_w, y * src_h / dst_h)` with no half-pixel offset. The
//! second interpolation corner is clamped to the last row/column so edges
//! are replicated.

use crate::frame::{CaptureFrame, BYTES_PER_PIXEL};

/// Resample `source` to `target_width` x `target_height`.
///
/// A zero target dimension yields an empty frame; an empty source yields a
/// black frame of the target size.
pub fn scale(source: &CaptureFrame, target_width: u32, target_height: u32) -> CaptureFrame {
    let mut out = CaptureFrame::default();
    scale_into(source, &mut out, target_width, target_height);
    out
}

/// Resample into an existing frame, reusing its allocation when the target
/// geometry is unchanged. Returns false if `source` had no pixels to sample.
pub fn scale_into(
    source: &CaptureFrame,
    dst: &mut CaptureFrame,
    target_width: u32,
    target_height: u32,
) -> bool {
    dst.ensure_geometry(target_width, target_height);
    if target_width == 0 || target_height == 0 {
        return true;
    }
    let (src_w, src_h) = (source.width(), source.height());
    if src_w == 0 || src_h == 0 {
        dst.fill(0);
        return false;
    }
    if src_w == target_width && src_h == target_height {
        dst.copy_from(source);
        return true;
    }

    let x_ratio = src_w as f32 / target_width as f32;
    let y_ratio = src_h as f32 / target_height as f32;
    let max_x = (src_w - 1) as f32;
    let max_y = (src_h - 1) as f32;

    let src = source.data();
    let src_stride = source.stride();
    let dst_stride = dst.stride();
    let out = dst.data_mut();

    // Horizontal sample positions are the same for every row
    let columns: Vec<(usize, usize, f32)> = (0..target_width)
        .map(|x| {
            let sx = (x as f32 * x_ratio).clamp(0.0, max_x);
            let x0 = sx as u32;
            let x1 = (x0 + 1).min(src_w - 1);
            (
                x0 as usize * BYTES_PER_PIXEL,
                x1 as usize * BYTES_PER_PIXEL,
                sx - x0 as f32,
            )
        })
        .collect();

    for y in 0..target_height {
        let sy = (y as f32 * y_ratio).clamp(0.0, max_y);
        let y0 = sy as u32;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = sy - y0 as f32;

        let row0 = &src[y0 as usize * src_stride..(y0 as usize + 1) * src_stride];
        let row1 = &src[y1 as usize * src_stride..(y1 as usize + 1) * src_stride];
        let dst_row = &mut out[y as usize * dst_stride..(y as usize + 1) * dst_stride];

        for (px, &(c0, c1, fx)) in dst_row.chunks_exact_mut(BYTES_PER_PIXEL).zip(&columns) {
            for c in 0..BYTES_PER_PIXEL {
                let top = row0[c0 + c] as f32 * (1.0 - fx) + row0[c1 + c] as f32 * fx;
                let bottom = row1[c0 + c] as f32 * (1.0 - fx) + row1[c1 + c] as f32 * fx;
                px[c] = (top * (1.0 - fy) + bottom * fy).round() as u8;
            }
        }
    }
    true
}

/// Largest size with the source aspect ratio that fits in `max_w` x `max_h`.
///
/// Both dimensions are rounded down to even numbers for codec macroblock
/// alignment. Degenerate input yields `(0, 0)`.
pub fn fit_dimensions(src_w: u32, src_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if src_w == 0 || src_h == 0 || max_w == 0 || max_h == 0 {
        return (0, 0);
    }
    let (sw, sh, mw, mh) = (src_w as u64, src_h as u64, max_w as u64, max_h as u64);
    let (w, h) = if sw * mh >= sh * mw {
        // Width-bound
        (mw, sh * mw / sw)
    } else {
        (sw * mh / sh, mh)
    };
    ((w as u32) & !1, (h as u32) & !1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> CaptureFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 10) as u8, (y * 10) as u8, 128]);
            }
        }
        CaptureFrame::from_rgb(width, height, data).unwrap()
    }

    #[test]
    fn test_identity_scale() {
        let src = gradient(7, 5);
        assert_eq!(scale(&src, 7, 5), src);
    }

    #[test]
    fn test_downscale_by_two_samples_even_pixels() {
        let src = gradient(4, 4);
        let out = scale(&src, 2, 2);
        assert_eq!(out.geometry(), crate::frame::Geometry::new(2, 2));
        // Exact integer sample positions, no blending
        assert_eq!(out.pixel(0, 0), src.pixel(0, 0));
        assert_eq!(out.pixel(1, 1), src.pixel(2, 2));
    }

    #[test]
    fn test_upscale_interpolates_and_replicates_edges() {
        let src = CaptureFrame::from_rgb(2, 1, vec![0, 0, 0, 100, 100, 100]).unwrap();
        let out = scale(&src, 4, 1);
        assert_eq!(out.pixel(0, 0), [0, 0, 0]);
        assert_eq!(out.pixel(1, 0), [50, 50, 50]);
        assert_eq!(out.pixel(2, 0), [100, 100, 100]);
        // Sample at x = 1.5 clamps to the last column
        assert_eq!(out.pixel(3, 0), [100, 100, 100]);
    }

    #[test]
    fn test_zero_target() {
        let out = scale(&gradient(4, 4), 0, 10);
        assert_eq!(out.data().len(), 0);
    }

    #[test]
    fn test_empty_source_gives_black_frame() {
        let mut dst = CaptureFrame::default();
        assert!(!scale_into(&CaptureFrame::default(), &mut dst, 3, 2));
        assert_eq!(dst.data().len(), 3 * 2 * 3);
        assert!(dst.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fit_dimensions() {
        assert_eq!(fit_dimensions(1920, 1080, 1280, 1280), (1280, 720));
        assert_eq!(fit_dimensions(1080, 1920, 1280, 1280), (720, 1280));
        assert_eq!(fit_dimensions(1366, 768, 1000, 1000), (1000, 562));
        assert_eq!(fit_dimensions(0, 1080, 1280, 720), (0, 0));
    }

    #[test]
    fn test_fit_dimensions_rounds_to_even() {
        let (w, h) = fit_dimensions(1001, 1001, 999, 999);
        assert_eq!((w, h), (998, 998));
    }
}
