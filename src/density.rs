// src/density.rs - Object counts and densities of a single channel stack

use std::fs;
use std::path::Path;

use csv::Writer;
use image::GrayImage;
use serde::Serialize;

use crate::config::{Config, Connectivity2d};
use crate::errors::{ProximityError, Result};
use crate::preprocess::{normalize_frame, threshold_and_binarize};
use crate::segmentation::{label_volume, segment_frame};
use crate::volume::Stack;

/// Physical units per cubic millimetre in um^3
const UM3_PER_MM3: f64 = 1e9;
/// Physical units per square millimetre in um^2
const UM2_PER_MM2: f64 = 1e6;

/// Object density of one channel stack
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityReport {
    pub name: String,
    pub channel: String,
    pub frames: usize,
    pub height: u32,
    pub width: u32,
    /// `frames * height * width`
    pub total_voxels: usize,
    /// Objects of the 3D labeling
    pub object_count: usize,
    /// Objects per mm^3
    pub density: f64,
    /// Objects of each frame's own 2D labeling
    pub frame_object_counts: Vec<usize>,
    /// Objects per mm^2 of each frame
    pub frame_densities: Vec<f64>,
}

/// Binarize every frame strictly above `th_percentage * max(frame)`
pub fn binarize_stack(stack: &Stack, th_percentage: f64) -> Vec<GrayImage> {
    stack
        .frames()
        .iter()
        .map(|frame| threshold_and_binarize(&normalize_frame(frame), th_percentage))
        .collect()
}

/// Count objects in 3D and per frame and scale the counts by the physical
/// voxel volume and frame area.
pub fn measure_density(name: &str, channel: &str, stack: &Stack, config: &Config) -> Result<DensityReport> {
    if stack.is_empty() {
        return Err(ProximityError::EmptyStack(format!("{} ({})", name, channel)));
    }

    let (frames, height, width) = stack.shape();
    let binary = binarize_stack(stack, config.density_th_percentage);

    let object_count = label_volume(&binary, config.density_connectivity).objects.len();
    let frame_object_counts: Vec<usize> = binary
        .iter()
        .enumerate()
        .map(|(index, frame)| segment_frame(frame, index, 0, Connectivity2d::Four).objects.len())
        .collect();

    let layer_surface = height as usize * width as usize;
    let total_voxels = frames * layer_surface;

    let pixel_area = config.x_y_ratio * config.x_y_ratio;
    let voxel_volume = pixel_area * config.z_ratio;

    let density = if total_voxels == 0 {
        0.0
    } else {
        object_count as f64 / (total_voxels as f64 * voxel_volume) * UM3_PER_MM3
    };
    let frame_densities = frame_object_counts
        .iter()
        .map(|&count| {
            if layer_surface == 0 {
                0.0
            } else {
                count as f64 / (layer_surface as f64 * pixel_area) * UM2_PER_MM2
            }
        })
        .collect();

    Ok(DensityReport {
        name: name.to_string(),
        channel: channel.to_string(),
        frames,
        height,
        width,
        total_voxels,
        object_count,
        density,
        frame_object_counts,
        frame_densities,
    })
}

/// Write one row per channel stack; per-frame columns follow the longest stack
pub fn write_density_csv<P: AsRef<Path>>(reports: &[DensityReport], output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let max_frames = reports.iter().map(|r| r.frames).max().unwrap_or(0);

    let mut header: Vec<String> = [
        "Name",
        "Channel",
        "Frames",
        "Height",
        "Width",
        "Total_Voxels",
        "Object_Count",
        "Density_mm3",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();
    for frame in 0..max_frames {
        header.push(format!("Frame_{}_Object_Count", frame));
    }
    for frame in 0..max_frames {
        header.push(format!("Frame_{}_Density_mm2", frame));
    }

    let mut writer = Writer::from_path(output_path)?;
    writer.write_record(&header)?;

    for report in reports {
        let mut record = vec![
            report.name.clone(),
            report.channel.clone(),
            report.frames.to_string(),
            report.height.to_string(),
            report.width.to_string(),
            report.total_voxels.to_string(),
            report.object_count.to_string(),
            format!("{:.6}", report.density),
        ];
        for frame in 0..max_frames {
            record.push(report.frame_object_counts.get(frame).map(|c| c.to_string()).unwrap_or_default());
        }
        for frame in 0..max_frames {
            record.push(report.frame_densities.get(frame).map(|d| format!("{:.6}", d)).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Connectivity3d;
    use crate::volume::IntensityFrame;
    use assert_approx_eq::assert_approx_eq;
    use image::Luma;

    fn frame(pixels: &[(u32, u32, u16)]) -> IntensityFrame {
        let mut frame = IntensityFrame::new(10, 10);
        for &(row, col, value) in pixels {
            frame.put_pixel(col, row, Luma([value]));
        }
        frame
    }

    fn unit_config() -> Config {
        Config {
            x_y_ratio: 1.0,
            z_ratio: 1.0,
            ..Config::default()
        }
    }

    #[test]
    fn counts_objects_in_volume_and_per_frame() {
        // One object spanning both frames plus one in frame 1 only
        let stack = Stack::new(vec![
            frame(&[(2, 2, 100)]),
            frame(&[(2, 2, 100), (7, 7, 100)]),
        ])
        .unwrap();

        let report = measure_density("s", "GFP", &stack, &unit_config()).unwrap();
        assert_eq!(report.total_voxels, 200);
        assert_eq!(report.object_count, 2);
        assert_eq!(report.frame_object_counts, vec![1, 2]);
        assert_approx_eq!(report.density, 2.0 / 200.0 * 1e9);
        assert_approx_eq!(report.frame_densities[1], 2.0 / 100.0 * 1e6);
    }

    #[test]
    fn threshold_is_relative_to_each_frame() {
        let stack = Stack::new(vec![frame(&[(1, 1, 1000), (5, 5, 400)]), frame(&[(5, 5, 40)])]).unwrap();
        let config = Config {
            density_th_percentage: 0.5,
            ..unit_config()
        };

        let report = measure_density("s", "GFP", &stack, &config).unwrap();
        assert_eq!(report.frame_object_counts, vec![1, 1]);
    }

    #[test]
    fn diagonal_neighbours_across_frames_depend_on_connectivity() {
        let stack = Stack::new(vec![frame(&[(2, 2, 10)]), frame(&[(3, 3, 10)])]).unwrap();

        let six = measure_density("s", "GFP", &stack, &unit_config()).unwrap();
        assert_eq!(six.object_count, 2);

        let config = Config {
            density_connectivity: Connectivity3d::TwentySix,
            ..unit_config()
        };
        let full = measure_density("s", "GFP", &stack, &config).unwrap();
        assert_eq!(full.object_count, 1);
    }

    #[test]
    fn physical_ratios_scale_the_density() {
        let stack = Stack::new(vec![frame(&[(2, 2, 10)])]).unwrap();
        let config = Config {
            x_y_ratio: 0.5,
            z_ratio: 0.1,
            ..Config::default()
        };

        let report = measure_density("s", "GFP", &stack, &config).unwrap();
        assert_approx_eq!(report.density, 1.0 / (100.0 * 0.025) * 1e9, 1e-3);
        assert_approx_eq!(report.frame_densities[0], 1.0 / (100.0 * 0.25) * 1e6, 1e-6);
    }

    #[test]
    fn empty_stack_is_rejected() {
        let stack = Stack::new(Vec::new()).unwrap();
        assert!(matches!(
            measure_density("s", "GFP", &stack, &unit_config()),
            Err(ProximityError::EmptyStack(_))
        ));
    }

    #[test]
    fn csv_pads_shorter_stacks() {
        let dir = std::env::temp_dir().join(format!("synapse_density_{}", std::process::id()));
        let path = dir.join("density.csv");

        let short = Stack::new(vec![frame(&[(2, 2, 10)])]).unwrap();
        let long = Stack::new(vec![frame(&[(2, 2, 10)]), frame(&[])]).unwrap();
        let reports = vec![
            measure_density("s", "GFP", &short, &unit_config()).unwrap(),
            measure_density("s", "SYPH", &long, &unit_config()).unwrap(),
        ];
        write_density_csv(&reports, &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 8 + 2 * 2);
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][1], "GFP");
        assert_eq!(&records[0][9], "");
        assert_eq!(&records[1][9], "0");

        fs::remove_dir_all(&dir).ok();
    }
}
