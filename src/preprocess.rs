// src/preprocess.rs - Per-frame normalization, thresholding and morphological cleanup

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};

use crate::config::StructuringElement;
use crate::errors::{ProximityError, Result};
use crate::volume::{IntensityFrame, FOREGROUND};

/// Upper intensity after normalization
pub const NORMALIZED_MAX: f32 = 255.0;

/// Normalized intensities in `[0, 255]`
pub type NormalizedFrame = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Structuring element of the opening/closing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kernel {
    pub shape: StructuringElement,
    pub radius: u8,
}

impl Kernel {
    pub fn new(shape: StructuringElement, radius: u8) -> Self {
        Self { shape, radius }
    }

    fn norm(&self) -> Norm {
        match self.shape {
            StructuringElement::Cross => Norm::L1,
            StructuringElement::Square => Norm::LInf,
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(StructuringElement::Cross, 1)
    }
}

/// Scale a frame so its maximum becomes 255.
///
/// An all-zero frame stays all-zero.
pub fn normalize_frame(frame: &IntensityFrame) -> NormalizedFrame {
    let (width, height) = frame.dimensions();
    let max = frame.pixels().map(|p| p[0]).max().unwrap_or(0);

    if max == 0 {
        return NormalizedFrame::new(width, height);
    }

    let scale = NORMALIZED_MAX / max as f32;
    ImageBuffer::from_fn(width, height, |x, y| {
        Luma([frame.get_pixel(x, y)[0] as f32 * scale])
    })
}

/// Binarize at `th_percentage * max(frame)`, strictly greater is foreground
pub fn threshold_and_binarize(frame: &NormalizedFrame, th_percentage: f64) -> GrayImage {
    let (width, height) = frame.dimensions();
    let max = frame.pixels().map(|p| p[0]).fold(0.0f32, f32::max);
    let threshold = max as f64 * th_percentage;

    ImageBuffer::from_fn(width, height, |x, y| {
        if frame.get_pixel(x, y)[0] as f64 > threshold {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// Opening followed by closing
pub fn open_close(binary: &GrayImage, kernel: Kernel) -> GrayImage {
    let opened = open(binary, kernel.norm(), kernel.radius);
    close(&opened, kernel.norm(), kernel.radius)
}

/// Rescale a frame so its maximum is 255; an empty frame stays empty
fn renormalize(binary: GrayImage) -> GrayImage {
    let max = binary.pixels().map(|p| p[0]).max().unwrap_or(0);
    if max == 0 || max == FOREGROUND {
        return binary;
    }

    let scale = FOREGROUND as f32 / max as f32;
    let (width, height) = binary.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        Luma([(binary.get_pixel(x, y)[0] as f32 * scale).round() as u8])
    })
}

/// Full cleanup of one frame: normalize, threshold, open, close.
///
/// Returns a 0/255 binary frame.
pub fn preprocess_frame(
    frame: &IntensityFrame,
    th_percentage: f64,
    kernel: Kernel,
) -> Result<GrayImage> {
    if !(0.0..=1.0).contains(&th_percentage) {
        return Err(ProximityError::InvalidParameter(format!(
            "th_percentage must be within [0, 1], got {}",
            th_percentage
        )));
    }
    if kernel.radius == 0 {
        return Err(ProximityError::InvalidParameter(
            "kernel radius must be greater than 0".to_string(),
        ));
    }

    let normalized = normalize_frame(frame);
    let binary = threshold_and_binarize(&normalized, th_percentage);
    Ok(renormalize(open_close(&binary, kernel)))
}
