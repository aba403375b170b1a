//! Display transforms applied to each captured frame.
//!
//! The capture loop keeps two copies of every frame: the raw frame that goes to the
//! recorder and a display copy for preview consumers. Everything here produces the
//! display copy; nothing mutates its input.

use crate::frame::Frame;

/// Which color planes are shown in color mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMask {
    /// Show the red plane
    pub red: bool,
    /// Show the green plane
    pub green: bool,
    /// Show the blue plane
    pub blue: bool,
}

impl ChannelMask {
    /// All planes visible.
    pub const ALL: ChannelMask = ChannelMask {
        red: true,
        green: true,
        blue: true,
    };

    /// True if at least one plane would be hidden.
    pub fn hides_any(&self) -> bool {
        !(self.red && self.green && self.blue)
    }
}

impl Default for ChannelMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Zero every hidden plane of a BGR frame.
///
/// With all three planes hidden the result is black. Single-channel frames are
/// returned unchanged.
pub fn mask_channels(frame: &Frame, mask: ChannelMask) -> Frame {
    if !frame.is_color() || !mask.hides_any() {
        return frame.clone();
    }

    let mut planes = frame.split_channels();
    // BGR order
    let visible = [mask.blue, mask.green, mask.red];
    for (plane, show) in planes.iter_mut().zip(visible) {
        if !show {
            plane.fill(0);
        }
    }
    Frame::merge_channels(frame.width, frame.height, &planes)
}

/// Convert a BGR frame to single-channel grayscale (BT.601 luma weights).
pub fn to_grayscale(frame: &Frame) -> Frame {
    if !frame.is_color() {
        return frame.clone();
    }

    let data = frame
        .data
        .chunks_exact(3)
        .map(|px| {
            let (b, g, r) = (px[0] as f32, px[1] as f32, px[2] as f32);
            (0.114 * b + 0.587 * g + 0.299 * r).round().clamp(0.0, 255.0) as u8
        })
        .collect();
    Frame::gray(frame.width, frame.height, data)
}

/// Observed minimum and maximum sample value. `(0, 0)` for an empty frame.
pub fn min_max(frame: &Frame) -> (u8, u8) {
    let mut iter = frame.data.iter().copied();
    let Some(first) = iter.next() else {
        return (0, 0);
    };
    iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// Linearly map `[min_display, max_display]` onto `[0, 255]`, saturating outside.
///
/// A degenerate window (`min_display >= max_display`) thresholds at `min_display`.
pub fn rescale(frame: &Frame, min_display: u8, max_display: u8) -> Frame {
    let data = if min_display >= max_display {
        frame
            .data
            .iter()
            .map(|&v| if v >= min_display { 255 } else { 0 })
            .collect()
    } else {
        let alpha = 255.0 / (max_display as f32 - min_display as f32);
        let beta = -(min_display as f32) * alpha;
        frame
            .data
            .iter()
            .map(|&v| (v as f32 * alpha + beta).round().clamp(0.0, 255.0) as u8)
            .collect()
    };
    Frame::from_bytes(frame.width, frame.height, frame.channels, data)
}
