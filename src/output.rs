// src/output.rs - CSV export of pair rows and the JSON run report

use std::fs;
use std::path::Path;

use csv::Writer;
use serde::Serialize;

use crate::config::Config;
use crate::distance::{Pixel, Separation};
use crate::errors::Result;
use crate::pipeline::BatchReport;
use crate::results::{PairResult, ResultTable, TableRecord, UnpairedFrame};
use crate::segmentation::SegmentedObject;
use crate::roi::{BoundingBox, RoiRect};

pub const OVERLAP: &str = "OVERLAP";
pub const CONTACT: &str = "CONTACT";

const PAIR_HEADER: [&str; 27] = [
    "ImageName",
    "Frame",
    "Channel_A",
    "Channel_B",
    "Object_Label",
    "Object2_Label",
    "Com_Row",
    "Com_Col",
    "Com2_Row",
    "Com2_Col",
    "Distance_Com",
    "Distance_um",
    "Object_ROI",
    "Object2_ROI",
    "Big_ROI",
    "ROI_Painted",
    "ROI_In_Map",
    "Area",
    "Area2",
    "Area_um",
    "Area2_um",
    "Object_Nearest_Point",
    "Object2_Nearest_Point",
    "Min_Distance",
    "Min_Distance_um",
    "Avg_Min_Distance",
    "Avg_Min_Distance_um",
];

fn format_bbox(bbox: &BoundingBox) -> String {
    format!("{} {} {} {}", bbox.min_row, bbox.min_col, bbox.max_row, bbox.max_col)
}

fn format_roi(roi: &RoiRect) -> String {
    if roi.is_empty() {
        return String::new();
    }
    format!("{} {} {} {}", roi.min_row, roi.min_col, roi.max_row, roi.max_col)
}

fn format_point(point: Pixel) -> String {
    format!("{} {}", point.0, point.1)
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

fn sentinel(separation: &Separation) -> Option<&'static str> {
    match separation {
        Separation::Overlap { .. } => Some(OVERLAP),
        Separation::Contact => Some(CONTACT),
        Separation::Apart(_) => None,
    }
}

/// Pixel distance cell; the sentinel for the non-`Apart` cases
fn distance_cell(separation: &Separation, value: Option<f64>) -> String {
    match sentinel(separation) {
        Some(s) => s.to_string(),
        None => format_optional(value),
    }
}

fn pair_record(row: &PairResult, channel_a: &str, channel_b: &str) -> Vec<String> {
    let nearest = row.separation.nearest_points();

    vec![
        row.image_name.clone(),
        row.frame.to_string(),
        channel_a.to_string(),
        channel_b.to_string(),
        row.label_a.to_string(),
        row.label_b.to_string(),
        format!("{:.4}", row.centroid_a.0),
        format!("{:.4}", row.centroid_a.1),
        format!("{:.4}", row.centroid_b.0),
        format!("{:.4}", row.centroid_b.1),
        format!("{:.6}", row.center_distance_px),
        format!("{:.6}", row.center_distance_um),
        format_bbox(&row.bbox_a),
        format_bbox(&row.bbox_b),
        format_roi(&row.roi),
        row.roi_painted.to_string(),
        row.roi_in_map.to_string(),
        row.area_a.to_string(),
        row.area_b.to_string(),
        format!("{:.6}", row.area_a_um),
        format!("{:.6}", row.area_b_um),
        nearest.map(|p| format_point(p.nearest_a)).unwrap_or_default(),
        nearest.map(|p| format_point(p.nearest_b)).unwrap_or_default(),
        distance_cell(&row.separation, row.separation.min_distance()),
        distance_cell(&row.separation, row.min_distance_um),
        distance_cell(&row.separation, row.separation.average_distance()),
        distance_cell(&row.separation, row.average_distance_um),
    ]
}

fn object_cell(object: Option<&SegmentedObject>, f: impl Fn(&SegmentedObject) -> String) -> String {
    object.map(f).unwrap_or_default()
}

/// Present side filled in, missing side and every distance left empty
fn unpaired_record(record: &UnpairedFrame, channel_a: &str, channel_b: &str) -> Vec<String> {
    let a = record.object_a.as_ref();
    let b = record.object_b.as_ref();

    vec![
        record.image_name.clone(),
        record.frame.to_string(),
        channel_a.to_string(),
        channel_b.to_string(),
        object_cell(a, |o| o.label.to_string()),
        object_cell(b, |o| o.label.to_string()),
        object_cell(a, |o| format!("{:.4}", o.centroid.0)),
        object_cell(a, |o| format!("{:.4}", o.centroid.1)),
        object_cell(b, |o| format!("{:.4}", o.centroid.0)),
        object_cell(b, |o| format!("{:.4}", o.centroid.1)),
        String::new(),
        String::new(),
        object_cell(a, |o| format_bbox(&o.bbox)),
        object_cell(b, |o| format_bbox(&o.bbox)),
        String::new(),
        false.to_string(),
        false.to_string(),
        object_cell(a, |o| o.area.to_string()),
        object_cell(b, |o| o.area.to_string()),
        format_optional(record.area_a_um),
        format_optional(record.area_b_um),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
    ]
}

/// Write one row per measured pair and per unpaired frame, in frame order
pub fn write_pairs_csv<P: AsRef<Path>>(
    table: &ResultTable,
    output_path: P,
    channel_a: &str,
    channel_b: &str,
) -> Result<()> {
    let output_path = output_path.as_ref();

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(output_path)?;
    writer.write_record(PAIR_HEADER)?;

    for record in table.records() {
        let cells = match record {
            TableRecord::Pair(row) => pair_record(row, channel_a, channel_b),
            TableRecord::Unpaired(unpaired) => unpaired_record(unpaired, channel_a, channel_b),
        };
        writer.write_record(&cells)?;
    }

    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct RunReport<'a> {
    parameters: &'a Config,
    elapsed_seconds: f64,
    #[serde(flatten)]
    batch: &'a BatchReport,
}

/// Record the parameters and per-group outcome of a run as JSON
pub fn write_run_report<P: AsRef<Path>>(
    config: &Config,
    batch: &BatchReport,
    elapsed_seconds: f64,
    output_path: P,
) -> Result<()> {
    let report = RunReport {
        parameters: config,
        elapsed_seconds,
        batch,
    };

    let json = serde_json::to_string_pretty(&report)?;
    fs::write(output_path, json)?;

    Ok(())
}
