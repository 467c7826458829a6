// src/roi.rs - Object bounding boxes and merged, frame-clamped regions of interest

use image::{GrayImage, Luma};
use serde::Serialize;

use crate::volume::FOREGROUND;

/// Half-open pixel box: rows `min_row..max_row`, cols `min_col..max_col`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub min_row: u32,
    pub min_col: u32,
    pub max_row: u32,
    pub max_col: u32,
}

impl BoundingBox {
    pub fn new(min_row: u32, min_col: u32, max_row: u32, max_col: u32) -> Self {
        Self {
            min_row,
            min_col,
            max_row,
            max_col,
        }
    }

    /// Grow the box so it contains `(row, col)`
    pub fn include(self, row: u32, col: u32) -> Self {
        Self {
            min_row: self.min_row.min(row),
            min_col: self.min_col.min(col),
            max_row: self.max_row.max(row + 1),
            max_col: self.max_col.max(col + 1),
        }
    }
}

/// Merged region of interest with inclusive corners.
///
/// Corners always lie in `[0, dim - 1]` with `min <= max`. `empty` is set
/// when the padded union does not intersect the frame at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoiRect {
    pub min_row: u32,
    pub min_col: u32,
    pub max_row: u32,
    pub max_col: u32,
    pub empty: bool,
}

impl RoiRect {
    fn empty_rect() -> Self {
        Self {
            min_row: 0,
            min_col: 0,
            max_row: 0,
            max_col: 0,
            empty: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// `max_row - min_row`
    pub fn row_extent(&self) -> u32 {
        self.max_row - self.min_row
    }

    /// `max_col - min_col`
    pub fn col_extent(&self) -> u32 {
        self.max_col - self.min_col
    }

    /// Does the ROI cover more than `cap` pixels on either axis
    pub fn exceeds(&self, cap: u32) -> bool {
        self.row_extent() >= cap || self.col_extent() >= cap
    }

    /// Should this ROI be painted given a size cap
    pub fn paintable(&self, cap: u32) -> bool {
        !self.empty && !self.exceeds(cap)
    }
}

/// Clamp an inclusive `[lo, hi]` interval to `[0, dim - 1]`
fn clamp_axis(lo: i64, hi: i64, dim: u32) -> Option<(u32, u32)> {
    if dim == 0 {
        return None;
    }
    let last = dim as i64 - 1;
    if lo > last || hi < 0 || lo > hi {
        return None;
    }
    Some((lo.max(0) as u32, hi.min(last) as u32))
}

/// Union of two boxes padded by `padding` on every side and clamped to a
/// `height` x `width` frame. The result does not depend on argument order.
pub fn merge_rois(a: &BoundingBox, b: &BoundingBox, padding: u32, height: u32, width: u32) -> RoiRect {
    let pad = padding as i64;

    // Half-open maxima become inclusive by dropping one pixel
    let min_row = a.min_row.min(b.min_row) as i64 - pad;
    let min_col = a.min_col.min(b.min_col) as i64 - pad;
    let max_row = a.max_row.max(b.max_row) as i64 - 1 + pad;
    let max_col = a.max_col.max(b.max_col) as i64 - 1 + pad;

    match (
        clamp_axis(min_row, max_row, height),
        clamp_axis(min_col, max_col, width),
    ) {
        (Some((min_row, max_row)), Some((min_col, max_col))) => RoiRect {
            min_row,
            min_col,
            max_row,
            max_col,
            empty: false,
        },
        _ => RoiRect::empty_rect(),
    }
}

/// Set every pixel of a non-empty ROI in a mask slice
pub fn paint_roi(mask: &mut GrayImage, roi: &RoiRect) {
    if roi.empty {
        return;
    }
    let (width, height) = mask.dimensions();
    for row in roi.min_row..=roi.max_row.min(height.saturating_sub(1)) {
        for col in roi.min_col..=roi.max_col.min(width.saturating_sub(1)) {
            mask.put_pixel(col, row, Luma([FOREGROUND]));
        }
    }
}
