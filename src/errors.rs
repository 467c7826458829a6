use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for the proximity engine
#[derive(Error, Debug)]
pub enum ProximityError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Channel shapes differ: {first:?} vs {second:?}")]
    ShapeMismatch {
        first: (usize, u32, u32),
        second: (usize, u32, u32),
    },

    #[error("Average of {k} nearest distances requested but only {available} point pairs exist")]
    InsufficientPairs {
        available: usize,
        k: usize,
    },

    #[error("Stack contains no frames: {0}")]
    EmptyStack(String),

    #[error("Unsupported TIFF sample format in {0}")]
    UnsupportedSampleFormat(PathBuf),

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("JSON output error: {0}")]
    JsonOutput(#[from] serde_json::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, ProximityError>;
