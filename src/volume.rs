// src/volume.rs - Intensity stacks and binary mask volumes

use image::{GrayImage, ImageBuffer, Luma};

use crate::errors::{ProximityError, Result};

/// Pixel value used for foreground in binary frames
pub const FOREGROUND: u8 = 255;

/// One intensity slice of a microscopy stack
pub type IntensityFrame = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Connected-component labels, 0 = background
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// An ordered stack of equally sized intensity frames
#[derive(Debug, Clone)]
pub struct Stack {
    frames: Vec<IntensityFrame>,
}

impl Stack {
    /// Build a stack, checking that every frame has the same dimensions
    pub fn new(frames: Vec<IntensityFrame>) -> Result<Self> {
        if let Some(first) = frames.first() {
            let dims = first.dimensions();
            if let Some((index, bad)) = frames
                .iter()
                .enumerate()
                .find(|(_, f)| f.dimensions() != dims)
            {
                return Err(ProximityError::InvalidParameter(format!(
                    "frame {} is {}x{} but frame 0 is {}x{}",
                    index,
                    bad.width(),
                    bad.height(),
                    dims.0,
                    dims.1
                )));
            }
        }

        Ok(Self { frames })
    }

    /// `(frames, height, width)`
    pub fn shape(&self) -> (usize, u32, u32) {
        match self.frames.first() {
            Some(f) => (self.frames.len(), f.height(), f.width()),
            None => (0, 0, 0),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[IntensityFrame] {
        &self.frames
    }
}

/// Binary mask volume stored as one slice per frame.
///
/// Each slice is owned independently so frames can be painted in parallel
/// and joined afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskVolume {
    frames: Vec<GrayImage>,
}

impl MaskVolume {
    pub fn from_frames(frames: Vec<GrayImage>) -> Self {
        Self { frames }
    }

    pub fn shape(&self) -> (usize, u32, u32) {
        match self.frames.first() {
            Some(f) => (self.frames.len(), f.height(), f.width()),
            None => (0, 0, 0),
        }
    }

    pub fn frames(&self) -> &[GrayImage] {
        &self.frames
    }

    /// Is the voxel at `(frame, row, col)` set
    pub fn is_set(&self, frame: usize, row: u32, col: u32) -> bool {
        self.frames
            .get(frame)
            .filter(|f| row < f.height() && col < f.width())
            .map(|f| f.get_pixel(col, row)[0] > 0)
            .unwrap_or(false)
    }

    /// Number of set voxels across all frames
    pub fn count_set(&self) -> usize {
        self.frames.iter().map(foreground_count).sum()
    }
}

/// Count foreground pixels of a binary frame
pub fn foreground_count(frame: &GrayImage) -> usize {
    frame.pixels().filter(|p| p[0] > 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_reports_shape() {
        let stack = Stack::new(vec![IntensityFrame::new(5, 4); 3]).unwrap();
        assert_eq!(stack.shape(), (3, 4, 5));
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.frames()[2].dimensions(), (5, 4));
    }

    #[test]
    fn stack_rejects_mixed_dimensions() {
        let frames = vec![IntensityFrame::new(4, 4), IntensityFrame::new(5, 4)];
        assert!(matches!(
            Stack::new(frames),
            Err(ProximityError::InvalidParameter(_))
        ));
    }

    #[test]
    fn mask_volume_lookup_is_bounds_checked() {
        let mut frames = vec![GrayImage::new(3, 2)];
        frames[0].put_pixel(2, 1, Luma([FOREGROUND]));
        let mask = MaskVolume::from_frames(frames);
        assert!(mask.is_set(0, 1, 2));
        assert!(!mask.is_set(0, 2, 1));
        assert!(!mask.is_set(1, 0, 0));
        assert_eq!(mask.count_set(), 1);
    }
}
