//! Captured frame storage.
//!
//! A [`CaptureFrame`] owns a tightly packed RGB24 buffer (3 bytes per pixel,
//! row-major, top-down, no row padding). Every hand-off between components is
//! a byte copy into another `CaptureFrame`; frames are never shared by
//! reference across threads.

use serde::Serialize;
use std::fmt;

/// Bytes per pixel of the normalized RGB24 format.
pub const BYTES_PER_PIXEL: usize = 3;

/// Width and height of a capture area or frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Size in bytes of one RGB24 frame with this geometry.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An RGB24 frame buffer.
///
/// The buffer length always equals `stride * height` with
/// `stride == width * 3`. Changing geometry reallocates.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CaptureFrame {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl fmt::Debug for CaptureFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("len", &self.data.len())
            .finish()
    }
}

impl CaptureFrame {
    /// Allocate a zero-filled frame.
    pub fn new(width: u32, height: u32) -> Self {
        let stride = width as usize * BYTES_PER_PIXEL;
        Self {
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    /// Wrap existing RGB24 bytes.
    ///
    /// Returns `None` if `data.len()` is not exactly `width * height * 3`.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let stride = width as usize * BYTES_PER_PIXEL;
        if data.len() != stride * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            stride,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.width, self.height)
    }

    /// True if no pixel storage has been allocated.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// One row of pixels.
    ///
    /// # Panics
    /// If `y` is not below the frame height.
    pub fn row(&self, y: u32) -> &[u8] {
        assert!(
            y < self.height,
            "row {} outside {}-row frame",
            y,
            self.height
        );
        let start = y as usize * self.stride;
        &self.data[start..start + self.stride]
    }

    /// RGB triple at `(x, y)`.
    ///
    /// # Panics
    /// If `(x, y)` lies outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        assert!(
            x < self.width && y < self.height,
            "pixel ({}, {}) outside {}x{} frame",
            x,
            y,
            self.width,
            self.height
        );
        let i = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Resize the buffer to the given geometry, reallocating only when the
    /// geometry actually changes. Returns true if a reallocation happened.
    ///
    /// Contents are unspecified after a reallocation (zero-filled).
    pub fn ensure_geometry(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height && !self.data.is_empty() {
            return false;
        }
        *self = Self::new(width, height);
        true
    }

    /// Copy another frame's pixels into this one, adopting its geometry.
    pub fn copy_from(&mut self, other: &CaptureFrame) {
        self.ensure_geometry(other.width, other.height);
        self.data.copy_from_slice(&other.data);
    }

    /// Fill every byte with `value`.
    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_geometry_invariant() {
        let frame = CaptureFrame::new(640, 480);
        assert_eq!(frame.stride(), 640 * 3);
        assert_eq!(frame.data().len(), frame.stride() * 480);
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_from_rgb_rejects_wrong_length() {
        assert!(CaptureFrame::from_rgb(2, 2, vec![0; 11]).is_none());
        let frame = CaptureFrame::from_rgb(2, 2, vec![7; 12]).unwrap();
        assert_eq!(frame.pixel(1, 1), [7, 7, 7]);
    }

    #[test]
    fn test_ensure_geometry_only_reallocates_on_change() {
        let mut frame = CaptureFrame::new(4, 4);
        frame.fill(9);
        assert!(!frame.ensure_geometry(4, 4));
        assert_eq!(frame.data()[0], 9);

        assert!(frame.ensure_geometry(8, 2));
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.data().len(), 8 * 3 * 2);
    }

    #[test]
    fn test_default_frame_allocates_lazily() {
        let mut frame = CaptureFrame::default();
        assert!(frame.is_empty());
        assert!(frame.ensure_geometry(0, 0));
        assert!(frame.ensure_geometry(1, 1));
        assert_eq!(frame.data().len(), 3);
    }

    #[test]
    fn test_copy_from_adopts_geometry() {
        let src = CaptureFrame::from_rgb(1, 2, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let mut dst = CaptureFrame::new(10, 10);
        dst.copy_from(&src);
        assert_eq!(dst, src);
        assert_eq!(dst.row(1), &[4, 5, 6]);
    }

    #[test]
    fn test_geometry_display_and_len() {
        let g = Geometry::new(1920, 1080);
        assert_eq!(g.to_string(), "1920x1080");
        assert_eq!(g.frame_len(), 1920 * 1080 * 3);
        assert!(Geometry::new(0, 5).is_empty());
    }

    #[test]
    #[should_panic(expected = "outside 4x2 frame")]
    fn test_pixel_out_of_range_panics() {
        let frame = CaptureFrame::new(4, 2);
        frame.pixel(4, 0);
    }

    #[test]
    #[should_panic(expected = "row 2 outside")]
    fn test_row_out_of_range_panics() {
        let frame = CaptureFrame::new(4, 2);
        frame.row(2);
    }
}
