//! Normalization of platform pixel layouts to packed RGB24.
//!
//! Screen APIs hand back BGR-ordered pixels, 3 or 4 bytes wide, with rows
//! that may be padded past `width * bytes_per_pixel`. Rows are always read
//! with the source's own stride. Depths below 8 bits pack several pixels
//! into a byte; `ByteOrder::MsbFirst` puts the leftmost pixel in the high
//! bits.

use std::sync::atomic::{AtomicBool, Ordering};

use super::errors::CaptureError;
use crate::frame::{CaptureFrame, BYTES_PER_PIXEL};

const RED_MASK: u32 = 0x00ff_0000;
const GREEN_MASK: u32 = 0x0000_ff00;
const BLUE_MASK: u32 = 0x0000_00ff;

static SLOW_PATH_LOGGED: AtomicBool = AtomicBool::new(false);

/// Byte order of multi-byte pixel values in the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LsbFirst,
    MsbFirst,
}

/// Describes how pixels are stored in a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLayout {
    pub bits_per_pixel: u8,
    /// Bytes per source row, including padding
    pub stride: usize,
    pub byte_order: ByteOrder,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
}

impl SourceLayout {
    /// 3 bytes per pixel, B,G,R, unpadded rows.
    pub fn bgr24(width: u32) -> Self {
        Self::standard(24, width as usize * 3)
    }

    /// 4 bytes per pixel, B,G,R,X, unpadded rows.
    pub fn bgrx32(width: u32) -> Self {
        Self::standard(32, width as usize * 4)
    }

    /// Little-endian 0xRRGGBB masks with the given depth and stride.
    pub fn standard(bits_per_pixel: u8, stride: usize) -> Self {
        Self {
            bits_per_pixel,
            stride,
            byte_order: ByteOrder::LsbFirst,
            red_mask: RED_MASK,
            green_mask: GREEN_MASK,
            blue_mask: BLUE_MASK,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }

    /// Bytes holding `width` pixels, without padding.
    fn row_bytes(&self, width: u32) -> usize {
        (width as usize * self.bits_per_pixel as usize).div_ceil(8)
    }

    /// Indexed or gray sources carry no channel masks.
    fn is_gray(&self) -> bool {
        self.red_mask == 0 && self.green_mask == 0 && self.blue_mask == 0
    }

    fn has_standard_masks(&self) -> bool {
        self.byte_order == ByteOrder::LsbFirst
            && self.red_mask == RED_MASK
            && self.green_mask == GREEN_MASK
            && self.blue_mask == BLUE_MASK
    }
}

/// Convert `src` into `dst` as top-down RGB24.
///
/// The source length is validated before `dst` is touched, so on error the
/// destination keeps its previous contents.
pub fn normalize_into(
    src: &[u8],
    layout: &SourceLayout,
    width: u32,
    height: u32,
    dst: &mut CaptureFrame,
) -> Result<(), CaptureError> {
    let bpp = layout.bits_per_pixel;
    if !matches!(bpp, 1 | 2 | 4 | 8 | 16 | 24 | 32) {
        return Err(CaptureError::AcquireFailed(format!(
            "unsupported source depth: {} bits per pixel",
            bpp
        )));
    }

    let row_bytes = layout.row_bytes(width);
    if layout.stride < row_bytes {
        return Err(CaptureError::AcquireFailed(format!(
            "source stride {} shorter than row ({} bytes)",
            layout.stride, row_bytes
        )));
    }
    let required = match height {
        0 => 0,
        h => layout.stride * (h as usize - 1) + row_bytes,
    };
    if src.len() < required {
        return Err(CaptureError::AcquireFailed(format!(
            "source image truncated: {} bytes, expected at least {}",
            src.len(),
            required
        )));
    }

    dst.ensure_geometry(width, height);
    let dst_stride = dst.stride();
    let out = dst.data_mut();

    match (bpp, layout.has_standard_masks()) {
        (32, true) | (24, true) => {
            let src_bpp = layout.bytes_per_pixel();
            for y in 0..height as usize {
                let src_row = &src[y * layout.stride..y * layout.stride + row_bytes];
                let dst_row = &mut out[y * dst_stride..(y + 1) * dst_stride];
                for (s, d) in src_row
                    .chunks_exact(src_bpp)
                    .zip(dst_row.chunks_exact_mut(BYTES_PER_PIXEL))
                {
                    d[0] = s[2];
                    d[1] = s[1];
                    d[2] = s[0];
                }
            }
        }
        _ => {
            if !SLOW_PATH_LOGGED.swap(true, Ordering::Relaxed) {
                log::warn!(
                    "Using slow per-pixel conversion for {}-bit {:?} source",
                    bpp,
                    layout.byte_order
                );
            }
            convert_per_pixel(src, layout, width, height, out, dst_stride);
        }
    }

    Ok(())
}

fn convert_per_pixel(
    src: &[u8],
    layout: &SourceLayout,
    width: u32,
    height: u32,
    out: &mut [u8],
    dst_stride: usize,
) {
    let bits = layout.bits_per_pixel as usize;
    let value_mask = if bits == 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    };
    for y in 0..height as usize {
        let row = &src[y * layout.stride..];
        for x in 0..width as usize {
            let value = if bits < 8 {
                read_packed(row, x, bits, layout.byte_order)
            } else {
                let offset = x * bits / 8;
                read_pixel(&row[offset..offset + bits / 8], layout.byte_order)
            };
            let d = y * dst_stride + x * BYTES_PER_PIXEL;
            if layout.is_gray() {
                let gray = extract_channel(value, value_mask);
                out[d..d + BYTES_PER_PIXEL].fill(gray);
            } else {
                out[d] = extract_channel(value, layout.red_mask);
                out[d + 1] = extract_channel(value, layout.green_mask);
                out[d + 2] = extract_channel(value, layout.blue_mask);
            }
        }
    }
}

/// Pixel `x` of a row packing `bits` (1, 2 or 4) bits per pixel.
fn read_packed(row: &[u8], x: usize, bits: usize, order: ByteOrder) -> u32 {
    let per_byte = 8 / bits;
    let byte = row[x / per_byte];
    let slot = x % per_byte;
    let shift = match order {
        ByteOrder::MsbFirst => 8 - bits * (slot + 1),
        ByteOrder::LsbFirst => bits * slot,
    };
    ((byte >> shift) as u32) & ((1 << bits) - 1)
}

fn read_pixel(bytes: &[u8], order: ByteOrder) -> u32 {
    match order {
        ByteOrder::LsbFirst => bytes
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32),
        ByteOrder::MsbFirst => bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32),
    }
}

/// Scale the masked channel to 0..=255.
fn extract_channel(value: u32, mask: u32) -> u8 {
    if mask == 0 {
        return 0;
    }
    let shift = mask.trailing_zeros();
    let max = mask >> shift;
    let raw = (value & mask) >> shift;
    ((raw as u64 * 255 + max as u64 / 2) / max as u64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgrx32_with_row_padding() {
        // 2x2 image, 4 bytes/pixel, 12-byte stride (4 bytes padding)
        let src = vec![
            3, 2, 1, 0, 6, 5, 4, 0, 0xEE, 0xEE, 0xEE, 0xEE, // row 0
            9, 8, 7, 0, 12, 11, 10, 0, 0xEE, 0xEE, 0xEE, 0xEE, // row 1
        ];
        let layout = SourceLayout::bgrx32(2).with_stride(12);
        let mut frame = CaptureFrame::default();
        normalize_into(&src, &layout, 2, 2, &mut frame).unwrap();
        assert_eq!(frame.data(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(frame.stride(), 6);
    }

    #[test]
    fn test_bgr24_aligned_rows() {
        // 1x2 image, BGR rows padded to 4 bytes
        let src = vec![30, 20, 10, 0, 60, 50, 40, 0];
        let layout = SourceLayout::bgr24(1).with_stride(4);
        let mut frame = CaptureFrame::default();
        normalize_into(&src, &layout, 1, 2, &mut frame).unwrap();
        assert_eq!(frame.data(), &[10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn test_last_row_needs_no_padding() {
        // Some APIs omit padding after the final row
        let src = vec![3, 2, 1, 0, 0xEE, 0xEE, 6, 5, 4, 0];
        let layout = SourceLayout::bgrx32(1).with_stride(6);
        let mut frame = CaptureFrame::default();
        normalize_into(&src, &layout, 1, 2, &mut frame).unwrap();
        assert_eq!(frame.data(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_rgb565_falls_back_to_per_pixel() {
        // Pure red and pure blue in 16-bit 5-6-5, little-endian
        let layout = SourceLayout {
            bits_per_pixel: 16,
            stride: 4,
            byte_order: ByteOrder::LsbFirst,
            red_mask: 0xF800,
            green_mask: 0x07E0,
            blue_mask: 0x001F,
        };
        let src = vec![0x00, 0xF8, 0x1F, 0x00];
        let mut frame = CaptureFrame::default();
        normalize_into(&src, &layout, 2, 1, &mut frame).unwrap();
        assert_eq!(frame.data(), &[255, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn test_msb_first_32bit() {
        let layout = SourceLayout {
            byte_order: ByteOrder::MsbFirst,
            ..SourceLayout::bgrx32(1)
        };
        // 0x00RRGGBB stored big-endian
        let src = vec![0x00, 0x11, 0x22, 0x33];
        let mut frame = CaptureFrame::default();
        normalize_into(&src, &layout, 1, 1, &mut frame).unwrap();
        assert_eq!(frame.data(), &[0x11, 0x22, 0x33]);
    }

    #[test]
    fn test_truncated_source_leaves_destination_untouched() {
        let mut frame = CaptureFrame::new(2, 2);
        frame.fill(42);
        let layout = SourceLayout::bgrx32(2);
        let result = normalize_into(&[0; 10], &layout, 2, 2, &mut frame);
        assert!(matches!(result, Err(CaptureError::AcquireFailed(_))));
        assert!(frame.data().iter().all(|&b| b == 42));
    }

    #[test]
    fn test_unsupported_depth_is_an_error() {
        let layout = SourceLayout::standard(12, 4);
        let mut frame = CaptureFrame::default();
        assert!(normalize_into(&[0; 8], &layout, 2, 2, &mut frame).is_err());
    }

    #[test]
    fn test_one_bit_gray_source() {
        // 10 pixels per row: 2 bytes, MSB first, 4-byte stride
        let layout = SourceLayout {
            bits_per_pixel: 1,
            stride: 4,
            byte_order: ByteOrder::MsbFirst,
            red_mask: 0,
            green_mask: 0,
            blue_mask: 0,
        };
        let src = vec![0b1010_0000, 0b0100_0000, 0xEE, 0xEE];
        let mut frame = CaptureFrame::default();
        normalize_into(&src, &layout, 10, 1, &mut frame).unwrap();

        let lit: Vec<bool> = frame.data().chunks_exact(3).map(|px| px[0] == 255).collect();
        assert_eq!(
            lit,
            [true, false, true, false, false, false, false, false, false, true]
        );
        assert!(frame.data().chunks_exact(3).all(|px| px[0] == px[1] && px[1] == px[2]));
    }

    #[test]
    fn test_four_bit_masked_source() {
        // 0b0RGB nibbles, low nibble first
        let layout = SourceLayout {
            bits_per_pixel: 4,
            stride: 1,
            byte_order: ByteOrder::LsbFirst,
            red_mask: 0b0100,
            green_mask: 0b0010,
            blue_mask: 0b0001,
        };
        let src = vec![0x14];
        let mut frame = CaptureFrame::default();
        normalize_into(&src, &layout, 2, 1, &mut frame).unwrap();
        assert_eq!(frame.data(), &[255, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn test_extract_channel_scales_to_8_bits() {
        assert_eq!(extract_channel(0x1F, 0x1F), 255);
        assert_eq!(extract_channel(0, 0x1F), 0);
        assert_eq!(extract_channel(0xAB00, 0xFF00), 0xAB);
    }
}
