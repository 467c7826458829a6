// src/lib.rs - Library interface for synapse proximity analysis

pub mod candidate;
pub mod config;
pub mod density;
pub mod distance;
pub mod errors;
pub mod image_io;
pub mod output;
pub mod pipeline;
pub mod preprocess;
pub mod results;
pub mod roi;
pub mod segmentation;
pub mod volume;

// Re-export commonly used types and functions
pub use config::{Config, PairingMode};
pub use density::{measure_density, DensityReport};
pub use errors::{ProximityError, Result};
pub use image_io::{group_channel_files, load_stack, save_stack, ChannelGroup};
pub use pipeline::{process_frame, process_stacks, run_batch, run_group, BatchReport, GroupSummary};
pub use results::{FrameAccumulator, GroupOutput, PairResult, ResultTable, TableRecord, UnpairedFrame};
pub use volume::{MaskVolume, Stack};

// Core stages
pub use candidate::{find_candidates, find_candidates_auto, CandidatePair};
pub use distance::{nearest_points, resolve_pair, NearestPoints, Separation};
pub use preprocess::{preprocess_frame, Kernel};
pub use roi::{merge_rois, BoundingBox, RoiRect};
pub use segmentation::{segment_frame, FrameSegmentation, SegmentedObject};
