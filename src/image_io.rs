// src/image_io.rs - Multi-page TIFF stacks and channel file grouping

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use image::GrayImage;
use log::warn;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};

use crate::errors::{ProximityError, Result};
use crate::volume::{IntensityFrame, Stack};

/// Two co-registered channel stacks of one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    /// Common file name prefix
    pub name: String,
    pub channel_a: PathBuf,
    pub channel_b: PathBuf,
    pub channel_a_name: String,
    /// Reference (neuropil) channel
    pub channel_b_name: String,
}

/// Load every page of a grayscale TIFF as one frame.
///
/// 8-bit pages are widened to 16 bits; other sample formats are rejected.
pub fn load_stack<P: AsRef<Path>>(path: P) -> Result<Stack> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

    let mut frames = Vec::new();
    loop {
        match decoder.colortype()? {
            tiff::ColorType::Gray(8) | tiff::ColorType::Gray(16) => {}
            _ => return Err(ProximityError::UnsupportedSampleFormat(path.to_path_buf())),
        }

        let (width, height) = decoder.dimensions()?;
        let samples: Vec<u16> = match decoder.read_image()? {
            DecodingResult::U8(buf) => buf.into_iter().map(u16::from).collect(),
            DecodingResult::U16(buf) => buf,
            _ => return Err(ProximityError::UnsupportedSampleFormat(path.to_path_buf())),
        };

        let frame = IntensityFrame::from_raw(width, height, samples)
            .ok_or_else(|| ProximityError::UnsupportedSampleFormat(path.to_path_buf()))?;
        frames.push(frame);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    if frames.is_empty() {
        return Err(ProximityError::EmptyStack(path.display().to_string()));
    }

    Stack::new(frames)
}

/// Write binary frames as a multi-page 8-bit TIFF
pub fn save_stack<P: AsRef<Path>>(frames: &[GrayImage], path: P) -> Result<()> {
    let path = path.as_ref();
    if frames.is_empty() {
        return Err(ProximityError::EmptyStack(path.display().to_string()));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    for frame in frames {
        encoder.write_image::<colortype::Gray8>(frame.width(), frame.height(), frame.as_raw())?;
    }

    Ok(())
}

fn is_tif(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "tif" | "tiff"))
        .unwrap_or(false)
}

/// All `.tif` / `.tiff` files directly inside a directory, sorted by name
pub fn get_tif_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.exists() {
        return Err(ProximityError::InvalidPath(dir_path.to_path_buf()));
    }

    if !dir_path.is_dir() {
        return Err(ProximityError::Config(format!(
            "{} is not a directory",
            dir_path.display()
        )));
    }

    let mut tif_files = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();
        if path.is_file() && is_tif(&path) {
            tif_files.push(path);
        }
    }
    tif_files.sort();

    Ok(tif_files)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Prefix before the first `_`, or the stem when there is none
fn common_part(name: &str) -> &str {
    let stem = name.split('.').next().unwrap_or(name);
    stem.split('_').next().unwrap_or(stem)
}

/// Token between the first `_` and the next `_` or the extension
fn channel_token(name: &str) -> String {
    let stem = name.split('.').next().unwrap_or(name);
    match stem.split_once('_') {
        Some((_, rest)) => rest.split('_').next().unwrap_or(rest).to_string(),
        None => stem.to_string(),
    }
}

/// Pair files of the same sample into channel groups.
///
/// Files sharing the prefix before the first `_` form a group. Inside a group
/// files whose name contains `reference_channel` sort last, the rest by name;
/// the last one becomes channel B. Groups without exactly two files are
/// skipped with a warning.
pub fn group_channel_files(files: &[PathBuf], reference_channel: &str) -> Vec<ChannelGroup> {
    let mut by_prefix: BTreeMap<String, Vec<&PathBuf>> = BTreeMap::new();
    for path in files {
        match file_name(path) {
            Some(name) => by_prefix.entry(common_part(name).to_string()).or_default().push(path),
            None => warn!("Ignoring file with a non UTF-8 name: {}", path.display()),
        }
    }

    let mut groups = Vec::new();
    for (prefix, mut members) in by_prefix {
        if members.len() != 2 {
            warn!(
                "Group {} has {} files, expected 2; skipping",
                prefix,
                members.len()
            );
            continue;
        }

        members.sort_by_key(|p| {
            let name = file_name(p).unwrap_or_default();
            (name.contains(reference_channel), name.to_string())
        });

        let (a, b) = (members[0], members[1]);
        groups.push(ChannelGroup {
            name: prefix,
            channel_a: a.clone(),
            channel_b: b.clone(),
            channel_a_name: channel_token(file_name(a).unwrap_or_default()),
            channel_b_name: channel_token(file_name(b).unwrap_or_default()),
        });
    }

    groups
}
