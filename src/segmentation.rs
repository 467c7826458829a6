// src/segmentation.rs - Connected-component labeling and per-object properties

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::config::{Connectivity2d, Connectivity3d, PersistenceFilter};
use crate::roi::BoundingBox;
use crate::volume::{LabelImage, FOREGROUND};

/// One connected component of a binary frame
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedObject {
    /// Positive label, unique within the frame's labeling pass
    pub label: u32,
    pub frame: usize,
    /// Mean pixel position as (row, col)
    pub centroid: (f64, f64),
    /// Pixel count, always >= 1
    pub area: u32,
    /// Half-open box in (row, col) coordinates
    pub bbox: BoundingBox,
}

/// Labels and surviving objects of one frame
#[derive(Debug, Clone)]
pub struct FrameSegmentation {
    pub frame: usize,
    pub labels: LabelImage,
    pub objects: Vec<SegmentedObject>,
}

impl FrameSegmentation {
    /// Pixel coordinates (row, col) of an object in raster order
    pub fn pixels_of(&self, object: &SegmentedObject) -> Vec<(u32, u32)> {
        let bbox = &object.bbox;
        let mut pixels = Vec::with_capacity(object.area as usize);

        for row in bbox.min_row..bbox.max_row {
            for col in bbox.min_col..bbox.max_col {
                if self.labels.get_pixel(col, row)[0] == object.label {
                    pixels.push((row, col));
                }
            }
        }

        pixels
    }

    /// Recount the pixels carrying `label` in the whole frame
    pub fn label_area(&self, label: u32) -> u32 {
        self.labels.pixels().filter(|p| p[0] == label).count() as u32
    }

    /// Index of the object with the most pixels; the first one wins a tie
    pub fn largest_index(&self) -> Option<usize> {
        let mut largest: Option<usize> = None;
        for (index, object) in self.objects.iter().enumerate() {
            if largest.map_or(true, |l| object.area > self.objects[l].area) {
                largest = Some(index);
            }
        }
        largest
    }

    pub fn largest_object(&self) -> Option<&SegmentedObject> {
        self.largest_index().map(|i| &self.objects[i])
    }
}

/// Running statistics of one label
#[derive(Debug, Clone, Copy)]
struct LabelStats {
    count: u64,
    sum_row: f64,
    sum_col: f64,
    min_row: u32,
    min_col: u32,
    max_row: u32,
    max_col: u32,
}

impl LabelStats {
    fn new(row: u32, col: u32) -> Self {
        Self {
            count: 0,
            sum_row: 0.0,
            sum_col: 0.0,
            min_row: row,
            min_col: col,
            max_row: row,
            max_col: col,
        }
    }

    fn add(&mut self, row: u32, col: u32) {
        self.count += 1;
        self.sum_row += row as f64;
        self.sum_col += col as f64;
        self.min_row = self.min_row.min(row);
        self.min_col = self.min_col.min(col);
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
    }
}

/// Label a binary frame, any non-zero pixel is foreground
pub fn label_frame(binary: &GrayImage, connectivity: Connectivity2d) -> LabelImage {
    let conn = match connectivity {
        Connectivity2d::Four => Connectivity::Four,
        Connectivity2d::Eight => Connectivity::Eight,
    };

    // imageproc only joins neighbours of equal value, so flatten to 0/255 first
    let mut flattened = binary.clone();
    for p in flattened.pixels_mut() {
        if p[0] > 0 {
            *p = Luma([FOREGROUND]);
        }
    }

    connected_components(&flattened, conn, Luma([0u8]))
}

/// Label a binary frame and extract every object larger than `min_area`
pub fn segment_frame(
    binary: &GrayImage,
    frame: usize,
    min_area: u32,
    connectivity: Connectivity2d,
) -> FrameSegmentation {
    let labels = label_frame(binary, connectivity);

    let mut stats: Vec<Option<LabelStats>> = Vec::new();
    for (col, row, pixel) in labels.enumerate_pixels() {
        let label = pixel[0] as usize;
        if label == 0 {
            continue;
        }
        if stats.len() <= label {
            stats.resize(label + 1, None);
        }
        stats[label]
            .get_or_insert_with(|| LabelStats::new(row, col))
            .add(row, col);
    }

    let objects = stats
        .iter()
        .enumerate()
        .filter_map(|(label, s)| s.map(|s| (label as u32, s)))
        .filter(|(_, s)| s.count > min_area as u64)
        .map(|(label, s)| SegmentedObject {
            label,
            frame,
            centroid: (s.sum_row / s.count as f64, s.sum_col / s.count as f64),
            area: s.count as u32,
            bbox: BoundingBox::new(s.min_row, s.min_col, s.max_row + 1, s.max_col + 1),
        })
        .collect();

    FrameSegmentation {
        frame,
        labels,
        objects,
    }
}

/// A connected component of a binary volume
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeObject {
    pub label: u32,
    pub voxels: usize,
    pub first_frame: usize,
    pub last_frame: usize,
    /// Mean voxel position as (frame, row, col)
    pub centroid: (f64, f64, f64),
    /// In-plane half-open box over all frames
    pub bbox: BoundingBox,
}

impl VolumeObject {
    /// Number of frames the component touches
    pub fn frames_spanned(&self) -> usize {
        self.last_frame - self.first_frame + 1
    }
}

/// Labels of a binary volume, one label image per frame
#[derive(Debug, Clone)]
pub struct VolumeLabels {
    pub labels: Vec<LabelImage>,
    pub objects: Vec<VolumeObject>,
}

fn find(parent: &mut [u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        let next = parent[x as usize];
        parent[x as usize] = parent[next as usize];
        x = next;
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (small, large) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[large as usize] = small;
    }
}

/// Offsets (frame, row, col) of already visited neighbours in raster order
fn backward_offsets(connectivity: Connectivity3d) -> Vec<(i64, i64, i64)> {
    match connectivity {
        Connectivity3d::Six => vec![(-1, 0, 0), (0, -1, 0), (0, 0, -1)],
        Connectivity3d::TwentySix => {
            let mut offsets = Vec::with_capacity(13);
            for dr in -1..=1 {
                for dc in -1..=1 {
                    offsets.push((-1, dr, dc));
                }
            }
            for dc in -1..=1 {
                offsets.push((0, -1, dc));
            }
            offsets.push((0, 0, -1));
            offsets
        }
    }
}

/// Two-pass union-find labeling of a binary volume.
///
/// Labels are consecutive from 1 in order of first appearance.
pub fn label_volume(frames: &[GrayImage], connectivity: Connectivity3d) -> VolumeLabels {
    let Some(first) = frames.first() else {
        return VolumeLabels {
            labels: Vec::new(),
            objects: Vec::new(),
        };
    };
    let (width, height) = first.dimensions();
    let (w, h, d) = (width as i64, height as i64, frames.len() as i64);
    let index = |f: i64, r: i64, c: i64| ((f * h + r) * w + c) as usize;

    let offsets = backward_offsets(connectivity);
    let mut provisional = vec![0u32; (d * h * w) as usize];
    let mut parent: Vec<u32> = vec![0];

    // Pass 1: provisional labels and equivalences
    for f in 0..d {
        let slice = &frames[f as usize];
        for r in 0..h {
            for c in 0..w {
                if slice.get_pixel(c as u32, r as u32)[0] == 0 {
                    continue;
                }

                let mut assigned = 0u32;
                for &(df, dr, dc) in &offsets {
                    let (nf, nr, nc) = (f + df, r + dr, c + dc);
                    if nf < 0 || nr < 0 || nc < 0 || nr >= h || nc >= w {
                        continue;
                    }
                    let neighbour = provisional[index(nf, nr, nc)];
                    if neighbour == 0 {
                        continue;
                    }
                    if assigned == 0 {
                        assigned = neighbour;
                    } else if assigned != neighbour {
                        union(&mut parent, assigned, neighbour);
                    }
                }

                if assigned == 0 {
                    assigned = parent.len() as u32;
                    parent.push(assigned);
                }
                provisional[index(f, r, c)] = assigned;
            }
        }
    }

    // Pass 2: resolve roots, renumber, collect stats
    let mut renumber = vec![0u32; parent.len()];
    let mut next_label = 1u32;
    let mut labels: Vec<LabelImage> = (0..frames.len())
        .map(|_| LabelImage::new(width, height))
        .collect();
    let mut objects: Vec<VolumeObject> = Vec::new();
    let mut sums: Vec<(f64, f64, f64)> = Vec::new();

    for f in 0..d {
        for r in 0..h {
            for c in 0..w {
                let provisional_label = provisional[index(f, r, c)];
                if provisional_label == 0 {
                    continue;
                }
                let root = find(&mut parent, provisional_label);
                if renumber[root as usize] == 0 {
                    renumber[root as usize] = next_label;
                    next_label += 1;
                    objects.push(VolumeObject {
                        label: renumber[root as usize],
                        voxels: 0,
                        first_frame: f as usize,
                        last_frame: f as usize,
                        centroid: (0.0, 0.0, 0.0),
                        bbox: BoundingBox::new(r as u32, c as u32, r as u32 + 1, c as u32 + 1),
                    });
                    sums.push((0.0, 0.0, 0.0));
                }

                let label = renumber[root as usize];
                labels[f as usize].put_pixel(c as u32, r as u32, Luma([label]));

                let slot = (label - 1) as usize;
                let object = &mut objects[slot];
                object.voxels += 1;
                object.last_frame = object.last_frame.max(f as usize);
                object.bbox = object.bbox.include(r as u32, c as u32);
                sums[slot].0 += f as f64;
                sums[slot].1 += r as f64;
                sums[slot].2 += c as f64;
            }
        }
    }

    for (object, sum) in objects.iter_mut().zip(&sums) {
        let n = object.voxels as f64;
        object.centroid = (sum.0 / n, sum.1 / n, sum.2 / n);
    }

    VolumeLabels { labels, objects }
}

/// Drop binary components that do not persist through enough frames
/// or whose voxel count is out of range. A component is kept when
/// `min_voxels <= voxels` and `voxels + 1 < max_voxels`.
pub fn apply_persistence_filter(frames: &[GrayImage], filter: &PersistenceFilter) -> Vec<GrayImage> {
    let volume = label_volume(frames, filter.connectivity);

    let keep: Vec<bool> = std::iter::once(false)
        .chain(volume.objects.iter().map(|o| {
            o.frames_spanned() >= filter.min_frames
                && o.voxels >= filter.min_voxels
                && o.voxels + 1 < filter.max_voxels
        }))
        .collect();

    volume
        .labels
        .iter()
        .map(|labels| {
            let (width, height) = labels.dimensions();
            GrayImage::from_fn(width, height, |x, y| {
                if keep[labels.get_pixel(x, y)[0] as usize] {
                    Luma([FOREGROUND])
                } else {
                    Luma([0])
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn binary(width: u32, height: u32, pixels: &[(u32, u32)]) -> GrayImage {
        let mut image = GrayImage::new(width, height);
        for &(row, col) in pixels {
            image.put_pixel(col, row, Luma([FOREGROUND]));
        }
        image
    }

    fn square(row: u32, col: u32, size: u32) -> Vec<(u32, u32)> {
        let mut pixels = Vec::new();
        for r in row..row + size {
            for c in col..col + size {
                pixels.push((r, c));
            }
        }
        pixels
    }

    #[test]
    fn extracts_centroid_area_and_bbox() {
        let image = binary(10, 10, &square(2, 3, 3));
        let seg = segment_frame(&image, 4, 0, Connectivity2d::Four);

        assert_eq!(seg.objects.len(), 1);
        let object = &seg.objects[0];
        assert_eq!(object.frame, 4);
        assert_eq!(object.area, 9);
        assert_approx_eq!(object.centroid.0, 3.0);
        assert_approx_eq!(object.centroid.1, 4.0);
        assert_eq!(object.bbox, BoundingBox::new(2, 3, 5, 6));
        assert_eq!(seg.pixels_of(object).len(), 9);
    }

    #[test]
    fn min_area_cutoff_is_strict() {
        let mut pixels = square(0, 0, 2);
        pixels.extend(square(5, 5, 3));
        let image = binary(10, 10, &pixels);

        let seg = segment_frame(&image, 0, 4, Connectivity2d::Four);
        assert_eq!(seg.objects.len(), 1);
        assert_eq!(seg.objects[0].area, 9);
    }

    #[test]
    fn diagonal_pixels_join_only_with_eight_connectivity() {
        let image = binary(4, 4, &[(0, 0), (1, 1)]);
        assert_eq!(segment_frame(&image, 0, 0, Connectivity2d::Four).objects.len(), 2);
        assert_eq!(segment_frame(&image, 0, 0, Connectivity2d::Eight).objects.len(), 1);
    }

    #[test]
    fn area_matches_label_count() {
        let mut pixels = square(1, 1, 3);
        pixels.extend(square(1, 6, 2));
        pixels.push((7, 7));
        let image = binary(10, 10, &pixels);

        let seg = segment_frame(&image, 0, 0, Connectivity2d::Four);
        assert_eq!(seg.objects.len(), 3);
        for object in &seg.objects {
            assert_eq!(seg.label_area(object.label), object.area);
            assert!(object.bbox.max_row <= 10 && object.bbox.max_col <= 10);
        }
    }

    #[test]
    fn empty_frame_has_no_objects() {
        let seg = segment_frame(&GrayImage::new(5, 5), 0, 0, Connectivity2d::Eight);
        assert!(seg.objects.is_empty());
        assert!(seg.largest_object().is_none());
    }

    #[test]
    fn largest_object_is_selected() {
        let mut pixels = square(0, 0, 2);
        pixels.extend(square(5, 5, 3));
        let seg = segment_frame(&binary(10, 10, &pixels), 0, 0, Connectivity2d::Four);
        assert_eq!(seg.largest_object().unwrap().area, 9);
    }

    #[test]
    fn volume_connectivity_six_vs_twenty_six() {
        let frames = vec![binary(4, 4, &[(1, 1)]), binary(4, 4, &[(2, 2)])];

        let six = label_volume(&frames, Connectivity3d::Six);
        assert_eq!(six.objects.len(), 2);

        let full = label_volume(&frames, Connectivity3d::TwentySix);
        assert_eq!(full.objects.len(), 1);
        let object = &full.objects[0];
        assert_eq!(object.voxels, 2);
        assert_eq!(object.frames_spanned(), 2);
        assert_approx_eq!(object.centroid.0, 0.5);
        assert_approx_eq!(object.centroid.1, 1.5);
        assert_eq!(object.bbox, BoundingBox::new(1, 1, 3, 3));
    }

    #[test]
    fn volume_labels_merge_u_shape() {
        // Two arms that only meet at the bottom row
        let pixels = [(0, 0), (1, 0), (2, 0), (2, 1), (2, 2), (1, 2), (0, 2)];
        let frames = vec![binary(3, 3, &pixels)];
        let volume = label_volume(&frames, Connectivity3d::Six);
        assert_eq!(volume.objects.len(), 1);
        assert_eq!(volume.objects[0].voxels, 7);
        assert_eq!(volume.labels[0].get_pixel(0, 0)[0], volume.labels[0].get_pixel(2, 0)[0]);
    }

    #[test]
    fn persistence_filter_keeps_multi_frame_components() {
        let frames = vec![
            binary(6, 6, &[(0, 0), (4, 4)]),
            binary(6, 6, &[(0, 0)]),
        ];
        let filter = PersistenceFilter {
            connectivity: Connectivity3d::TwentySix,
            min_frames: 2,
            min_voxels: 1,
            max_voxels: 10,
        };

        let kept = apply_persistence_filter(&frames, &filter);
        assert_eq!(kept[0].get_pixel(0, 0)[0], FOREGROUND);
        assert_eq!(kept[1].get_pixel(0, 0)[0], FOREGROUND);
        assert_eq!(kept[0].get_pixel(4, 4)[0], 0);
    }

    #[test]
    fn default_persistence_filter_keeps_large_blocks() {
        let block = square(0, 0, 100)
            .into_iter()
            .filter(|&(_, col)| col < 60)
            .collect::<Vec<_>>();
        let frames = vec![binary(100, 100, &block), binary(100, 100, &block)];

        let kept = apply_persistence_filter(&frames, &PersistenceFilter::default());
        let voxels: usize = kept.iter().map(|f| f.pixels().filter(|p| p[0] == FOREGROUND).count()).sum();
        assert_eq!(voxels, 12_000);
    }

    #[test]
    fn persistence_voxel_bounds() {
        // 2 frames x 4 pixels = 8 voxels
        let frames = vec![binary(6, 6, &square(1, 1, 2)), binary(6, 6, &square(1, 1, 2))];
        let filter = |min_voxels, max_voxels| PersistenceFilter {
            connectivity: Connectivity3d::Six,
            min_frames: 2,
            min_voxels,
            max_voxels,
        };

        let kept = |f: PersistenceFilter| apply_persistence_filter(&frames, &f)[0].get_pixel(1, 1)[0];
        assert_eq!(kept(filter(8, 10)), FOREGROUND);
        assert_eq!(kept(filter(9, 10)), 0);
        assert_eq!(kept(filter(1, 9)), 0);
    }
}
