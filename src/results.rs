// src/results.rs - Pair records, per-frame accumulators and the joined result table

use image::GrayImage;

use crate::distance::{centroid_distance, Separation};
use crate::roi::{paint_roi, BoundingBox, RoiRect};
use crate::segmentation::SegmentedObject;
use crate::volume::MaskVolume;

/// One measured object pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairResult {
    pub image_name: String,
    pub frame: usize,
    pub label_a: u32,
    pub label_b: u32,
    pub centroid_a: (f64, f64),
    pub centroid_b: (f64, f64),
    pub area_a: u32,
    pub area_b: u32,
    pub area_a_um: f64,
    pub area_b_um: f64,
    pub bbox_a: BoundingBox,
    pub bbox_b: BoundingBox,
    pub center_distance_px: f64,
    pub center_distance_um: f64,
    pub separation: Separation,
    /// Perimeter distance in physical units, absent for OVERLAP / CONTACT
    pub min_distance_um: Option<f64>,
    pub average_distance_um: Option<f64>,
    pub roi: RoiRect,
    /// Whether the ROI footprint was drawn into the mask volume
    pub roi_painted: bool,
    /// Whether the ROI is small enough for the overview map
    pub roi_in_map: bool,
}

impl PairResult {
    /// Assemble a row; physical values are pixel values times `x_y_ratio`
    pub fn new(
        image_name: &str,
        a: &SegmentedObject,
        b: &SegmentedObject,
        separation: Separation,
        roi: RoiRect,
        x_y_ratio: f64,
    ) -> Self {
        let center_distance_px = centroid_distance(a.centroid, b.centroid);
        let area_scale = x_y_ratio * x_y_ratio;

        Self {
            image_name: image_name.to_string(),
            frame: a.frame,
            label_a: a.label,
            label_b: b.label,
            centroid_a: a.centroid,
            centroid_b: b.centroid,
            area_a: a.area,
            area_b: b.area,
            area_a_um: a.area as f64 * area_scale,
            area_b_um: b.area as f64 * area_scale,
            bbox_a: a.bbox,
            bbox_b: b.bbox,
            center_distance_px,
            center_distance_um: center_distance_px * x_y_ratio,
            separation,
            min_distance_um: separation.min_distance().map(|d| d * x_y_ratio),
            average_distance_um: separation.average_distance().map(|d| d * x_y_ratio),
            roi,
            roi_painted: false,
            roi_in_map: false,
        }
    }
}

/// Largest-object frame in which at least one channel has no object.
///
/// Every distance is undefined; the fields of a missing side are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnpairedFrame {
    pub image_name: String,
    pub frame: usize,
    pub object_a: Option<SegmentedObject>,
    pub object_b: Option<SegmentedObject>,
    pub area_a_um: Option<f64>,
    pub area_b_um: Option<f64>,
}

impl UnpairedFrame {
    pub fn new(
        image_name: &str,
        frame: usize,
        a: Option<&SegmentedObject>,
        b: Option<&SegmentedObject>,
        x_y_ratio: f64,
    ) -> Self {
        let area_um = |o: &SegmentedObject| o.area as f64 * x_y_ratio * x_y_ratio;

        Self {
            image_name: image_name.to_string(),
            frame,
            object_a: a.cloned(),
            object_b: b.cloned(),
            area_a_um: a.map(area_um),
            area_b_um: b.map(area_um),
        }
    }
}

/// One line of the result table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TableRecord<'a> {
    Pair(&'a PairResult),
    Unpaired(&'a UnpairedFrame),
}

impl TableRecord<'_> {
    pub fn frame(&self) -> usize {
        match self {
            TableRecord::Pair(row) => row.frame,
            TableRecord::Unpaired(record) => record.frame,
        }
    }
}

/// Rows and mask slice of a single frame.
///
/// Owned by the worker processing that frame; joined into a
/// [`ResultTable`] once every frame is done.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    pub frame: usize,
    rows: Vec<PairResult>,
    unpaired: Option<UnpairedFrame>,
    mask: GrayImage,
    paint_cap: u32,
}

impl FrameAccumulator {
    pub fn new(frame: usize, height: u32, width: u32, paint_cap: u32) -> Self {
        Self {
            frame,
            rows: Vec::new(),
            unpaired: None,
            mask: GrayImage::new(width, height),
            paint_cap,
        }
    }

    /// Append a row, painting its ROI when it is non-empty and within the cap
    pub fn record(&mut self, mut row: PairResult) {
        if row.roi.paintable(self.paint_cap) {
            paint_roi(&mut self.mask, &row.roi);
            row.roi_painted = true;
        }
        self.rows.push(row);
    }

    /// Mark the frame as lacking an object in one or both channels
    pub fn record_unpaired(&mut self, record: UnpairedFrame) {
        self.unpaired = Some(record);
    }

    pub fn rows(&self) -> &[PairResult] {
        &self.rows
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub fn into_parts(self) -> (Vec<PairResult>, Option<UnpairedFrame>, GrayImage) {
        (self.rows, self.unpaired, self.mask)
    }
}

/// All rows of a file group, in frame order then discovery order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<PairResult>,
    unpaired: Vec<UnpairedFrame>,
}

impl ResultTable {
    /// Join per-frame partials; frames may arrive in any order
    pub fn join(mut frames: Vec<FrameAccumulator>) -> (ResultTable, MaskVolume) {
        frames.sort_by_key(|f| f.frame);

        let mut rows = Vec::new();
        let mut unpaired = Vec::new();
        let mut masks = Vec::with_capacity(frames.len());
        for frame in frames {
            let (frame_rows, frame_unpaired, mask) = frame.into_parts();
            rows.extend(frame_rows);
            unpaired.extend(frame_unpaired);
            masks.push(mask);
        }

        (ResultTable { rows, unpaired }, MaskVolume::from_frames(masks))
    }

    /// Measured pairs only
    pub fn rows(&self) -> &[PairResult] {
        &self.rows
    }

    pub fn unpaired(&self) -> &[UnpairedFrame] {
        &self.unpaired
    }

    /// Pairs and unpaired frames merged in frame order
    pub fn records(&self) -> Vec<TableRecord<'_>> {
        let mut records: Vec<TableRecord<'_>> = self
            .rows
            .iter()
            .map(TableRecord::Pair)
            .chain(self.unpaired.iter().map(TableRecord::Unpaired))
            .collect();
        records.sort_by_key(|r| r.frame());
        records
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn overlap_count(&self) -> usize {
        self.rows.iter().filter(|r| r.separation.is_overlap()).count()
    }
}

/// Terminal output of one file group
#[derive(Debug, Clone)]
pub struct GroupOutput {
    pub name: String,
    pub table: ResultTable,
    pub mask: MaskVolume,
    /// Preprocessed binary frames of channel A
    pub filtered_a: Vec<GrayImage>,
    /// Preprocessed binary frames of channel B
    pub filtered_b: Vec<GrayImage>,
}
