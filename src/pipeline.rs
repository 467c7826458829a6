// src/pipeline.rs - Frame and file-group orchestration of the proximity engine

use std::path::PathBuf;
use std::time::Instant;

use image::GrayImage;
use log::{debug, error, info, warn};
use rayon::prelude::*;

use crate::candidate::{centroid_distance_sq, find_candidates_auto, CandidatePair};
use crate::config::{Config, PairingMode};
use crate::distance::resolve_pair;
use crate::density::{measure_density, write_density_csv};
use crate::errors::{ProximityError, Result};
use crate::image_io::{load_stack, save_stack, ChannelGroup};
use crate::output::write_pairs_csv;
use crate::preprocess::{preprocess_frame, Kernel};
use crate::results::{FrameAccumulator, GroupOutput, PairResult, ResultTable, UnpairedFrame};
use crate::roi::merge_rois;
use crate::segmentation::{apply_persistence_filter, segment_frame, FrameSegmentation};
use crate::volume::Stack;

/// Outcome of one processed file group
#[derive(Debug, Clone, serde::Serialize)]
pub struct GroupSummary {
    pub name: String,
    pub channel_a: String,
    pub channel_b: String,
    pub frames: usize,
    pub pairs: usize,
    /// Largest-object frames missing an object in one or both channels
    pub unpaired_frames: usize,
    pub overlaps: usize,
    pub painted_rois: usize,
    pub mask_voxels: usize,
    pub results_path: PathBuf,
    pub density_path: PathBuf,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BatchReport {
    pub processed: Vec<GroupSummary>,
    /// (group, reason) for groups skipped because of a shape mismatch
    pub skipped: Vec<(String, String)>,
    /// (group, error) for groups that failed
    pub failed: Vec<(String, String)>,
}

/// Run `f` over `items`, in parallel when configured; output order follows input order
fn map_maybe_parallel<T, R, F>(items: Vec<T>, parallel: bool, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    if parallel {
        items.into_par_iter().map(f).collect()
    } else {
        items.into_iter().map(f).collect()
    }
}

/// Threshold, open and close every frame of a stack
pub fn preprocess_stack(stack: &Stack, config: &Config) -> Result<Vec<GrayImage>> {
    let kernel = Kernel::new(config.structuring_element, config.kernel_radius);
    let frames: Vec<_> = stack.frames().iter().collect();

    map_maybe_parallel(frames, config.use_parallel, |frame| {
        preprocess_frame(frame, config.th_percentage, kernel)
    })
    .into_iter()
    .collect()
}

/// Propose pairs for one frame according to the pairing mode
fn propose_pairs(
    seg_a: &FrameSegmentation,
    seg_b: &FrameSegmentation,
    config: &Config,
) -> Vec<CandidatePair> {
    match config.pairing {
        PairingMode::AllPairs => {
            find_candidates_auto(&seg_a.objects, &seg_b.objects, config.max_distance_px_sq())
        }
        PairingMode::LargestObject => match (seg_a.largest_index(), seg_b.largest_index()) {
            (Some(a), Some(b)) => vec![CandidatePair {
                a,
                b,
                distance_sq: centroid_distance_sq(&seg_a.objects[a], &seg_b.objects[b]),
            }],
            _ => Vec::new(),
        },
    }
}

/// Segment both channels of one frame and measure every proposed pair
pub fn process_frame(
    image_name: &str,
    frame: usize,
    binary_a: &GrayImage,
    binary_b: &GrayImage,
    config: &Config,
) -> Result<FrameAccumulator> {
    let (width, height) = binary_a.dimensions();

    let seg_a = segment_frame(binary_a, frame, config.min_area, config.connectivity);
    let seg_b = segment_frame(binary_b, frame, config.min_area, config.connectivity);

    let pairs = propose_pairs(&seg_a, &seg_b, config);
    debug!(
        "{} frame {}: {} + {} objects, {} candidate pairs",
        image_name,
        frame,
        seg_a.objects.len(),
        seg_b.objects.len(),
        pairs.len()
    );

    let rows: Vec<Result<PairResult>> = map_maybe_parallel(pairs, config.use_parallel, |pair| {
        let object_a = &seg_a.objects[pair.a];
        let object_b = &seg_b.objects[pair.b];

        let separation = resolve_pair(
            &seg_a.pixels_of(object_a),
            &seg_b.pixels_of(object_b),
            config.average_k,
        )?;
        let roi = merge_rois(&object_a.bbox, &object_b.bbox, config.roi_padding, height, width);

        let mut row = PairResult::new(
            image_name,
            object_a,
            object_b,
            separation,
            roi,
            config.x_y_ratio,
        );
        row.roi_in_map = roi.paintable(config.roi_map_cap);
        Ok(row)
    });

    let mut accumulator = FrameAccumulator::new(frame, height, width, config.roi_paint_cap);
    for row in rows {
        accumulator.record(row?);
    }

    // Largest-object runs keep one record per frame
    if config.pairing == PairingMode::LargestObject && accumulator.rows().is_empty() {
        accumulator.record_unpaired(UnpairedFrame::new(
            image_name,
            frame,
            seg_a.largest_object(),
            seg_b.largest_object(),
            config.x_y_ratio,
        ));
    }

    Ok(accumulator)
}

/// Run the whole engine on two co-registered stacks
pub fn process_stacks(
    image_name: &str,
    stack_a: &Stack,
    stack_b: &Stack,
    config: &Config,
) -> Result<GroupOutput> {
    if stack_a.shape() != stack_b.shape() {
        return Err(ProximityError::ShapeMismatch {
            first: stack_a.shape(),
            second: stack_b.shape(),
        });
    }
    if stack_a.is_empty() {
        return Err(ProximityError::EmptyStack(image_name.to_string()));
    }

    let mut filtered_a = preprocess_stack(stack_a, config)?;
    let mut filtered_b = preprocess_stack(stack_b, config)?;

    if let Some(filter) = &config.persistence {
        filtered_a = apply_persistence_filter(&filtered_a, filter);
        filtered_b = apply_persistence_filter(&filtered_b, filter);
    }

    let frames: Vec<usize> = (0..stack_a.len()).collect();
    let accumulators = map_maybe_parallel(frames, config.use_parallel, |frame| {
        process_frame(image_name, frame, &filtered_a[frame], &filtered_b[frame], config)
    })
    .into_iter()
    .collect::<Result<Vec<_>>>()?;

    let (table, mask) = ResultTable::join(accumulators);
    info!(
        "{}: {} frames, {} pairs ({} overlapping)",
        image_name,
        stack_a.len(),
        table.len(),
        table.overlap_count()
    );

    Ok(GroupOutput {
        name: image_name.to_string(),
        table,
        mask,
        filtered_a,
        filtered_b,
    })
}

/// Load, process and write the outputs of one channel group
pub fn run_group(group: &ChannelGroup, config: &Config) -> Result<GroupSummary> {
    let start_time = Instant::now();
    info!(
        "Processing group {} ({} / {})",
        group.name, group.channel_a_name, group.channel_b_name
    );

    let stack_a = load_stack(&group.channel_a)?;
    let stack_b = load_stack(&group.channel_b)?;
    let output = process_stacks(&group.name, &stack_a, &stack_b, config)?;

    let output_dir = PathBuf::from(&config.output_base_dir);
    let results_path = output_dir.join(format!("{}_pairs.csv", group.name));
    write_pairs_csv(&output.table, &results_path, &group.channel_a_name, &group.channel_b_name)?;

    let density_path = output_dir.join(format!("{}_density.csv", group.name));
    let densities = vec![
        measure_density(&group.name, &group.channel_a_name, &stack_a, config)?,
        measure_density(&group.name, &group.channel_b_name, &stack_b, config)?,
    ];
    write_density_csv(&densities, &density_path)?;

    if config.save_filtered {
        let filtered_dir = output_dir.join("Filtered");
        save_stack(&output.filtered_a, filtered_dir.join(format!("{}_{}_closed.tif", group.name, group.channel_a_name)))?;
        save_stack(&output.filtered_b, filtered_dir.join(format!("{}_{}_closed.tif", group.name, group.channel_b_name)))?;
        save_stack(output.mask.frames(), filtered_dir.join(format!("{}_mask.tif", group.name)))?;
    }

    debug!("{} finished in {:.2} s", group.name, start_time.elapsed().as_secs_f64());

    Ok(GroupSummary {
        name: group.name.clone(),
        channel_a: group.channel_a_name.clone(),
        channel_b: group.channel_b_name.clone(),
        frames: stack_a.len(),
        pairs: output.table.len(),
        unpaired_frames: output.table.unpaired().len(),
        overlaps: output.table.overlap_count(),
        painted_rois: output.table.rows().iter().filter(|r| r.roi_painted).count(),
        mask_voxels: output.mask.count_set(),
        results_path,
        density_path,
    })
}

/// Process every group; shape mismatches are skipped, other errors recorded
pub fn run_batch(groups: &[ChannelGroup], config: &Config) -> BatchReport {
    let outcomes = map_maybe_parallel(groups.iter().collect::<Vec<_>>(), config.use_parallel, |group| {
        (group.name.clone(), run_group(group, config))
    });

    let mut report = BatchReport::default();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(summary) => report.processed.push(summary),
            Err(e @ ProximityError::ShapeMismatch { .. }) => {
                warn!("Skipping {}: {}", name, e);
                report.skipped.push((name, e.to_string()));
            }
            Err(e) => {
                error!("Group {} failed: {}", name, e);
                report.failed.push((name, e.to_string()));
            }
        }
    }

    report
}
