//! Image frames as delivered by the scope.
//!
//! # Storage
//! Pixel data is stored as 8-bit samples in a `Vec<u8>`.
//! - 1 channel: grayscale, one byte per pixel.
//! - 3 channels: interleaved B, G, R (the sensor's native order), three bytes per pixel.

/// Width of the placeholder frame shown when a frame is dropped.
pub const DROPPED_FRAME_WIDTH: u32 = 752;

/// Height of the placeholder frame shown when a frame is dropped.
pub const DROPPED_FRAME_HEIGHT: u32 = 480;

/// A single 8-bit image frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Samples per pixel (1 or 3)
    pub channels: u8,

    /// Raw pixel data, row-major, channels interleaved
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame from raw interleaved data.
    ///
    /// The caller must ensure `data.len() == width * height * channels`.
    pub fn from_bytes(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * channels as usize);
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Create a single-channel grayscale frame.
    pub fn gray(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self::from_bytes(width, height, 1, data)
    }

    /// Create a frame with every sample set to zero.
    pub fn zeros(width: u32, height: u32, channels: u8) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self::from_bytes(width, height, channels, vec![0; len])
    }

    /// Create a three-channel frame filled with one BGR color.
    pub fn filled_bgr(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self::from_bytes(width, height, 3, data)
    }

    /// Number of pixels in the frame.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True for three-channel frames.
    pub fn is_color(&self) -> bool {
        self.channels == 3
    }

    /// Sample at (x, y) in `channel`, if in bounds.
    pub fn get(&self, x: u32, y: u32, channel: u8) -> Option<u8> {
        if x >= self.width || y >= self.height || channel >= self.channels {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * self.channels as usize
            + channel as usize;
        self.data.get(idx).copied()
    }

    /// Split an interleaved frame into one plane per channel.
    pub fn split_channels(&self) -> Vec<Vec<u8>> {
        let n = self.channels as usize;
        let mut planes = vec![Vec::with_capacity(self.pixel_count()); n];
        for pixel in self.data.chunks_exact(n) {
            for (plane, &sample) in planes.iter_mut().zip(pixel) {
                plane.push(sample);
            }
        }
        planes
    }

    /// Interleave equally sized planes back into a frame.
    pub fn merge_channels(width: u32, height: u32, planes: &[Vec<u8>]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * planes.len());
        for i in 0..pixels {
            for plane in planes {
                data.push(plane.get(i).copied().unwrap_or(0));
            }
        }
        Self::from_bytes(width, height, planes.len() as u8, data)
    }

    /// The placeholder pushed to preview consumers when a retrieve fails.
    ///
    /// Solid blue with a white band across the middle, so a stale preview is never
    /// mistaken for live data.
    pub fn dropped_placeholder() -> Self {
        let mut frame = Self::filled_bgr(DROPPED_FRAME_WIDTH, DROPPED_FRAME_HEIGHT, [255, 0, 0]);
        let band_top = DROPPED_FRAME_HEIGHT / 2 - 12;
        let band_bottom = DROPPED_FRAME_HEIGHT / 2 + 12;
        let row_bytes = DROPPED_FRAME_WIDTH as usize * 3;
        for y in band_top..band_bottom {
            let start = y as usize * row_bytes + 24 * 3;
            let end = (y as usize + 1) * row_bytes - 24 * 3;
            frame.data[start..end].fill(255);
        }
        frame
    }
}
