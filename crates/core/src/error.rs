use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Settings that cannot be used to start the loop.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{key}` must be {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("threshold must be between 0.0 and 1.0, got {0}")]
    ThresholdOutOfRange(f64),
    #[error("invalid click speed: min={min}, max={max} (need 0 <= min <= max <= 3600)")]
    InvalidDelays { min: f64, max: f64 },
    #[error("scan interval must be 1-86400 seconds or disabled, got {0}")]
    InvalidScanInterval(f64),
    #[error("random offset must be >= 0, got {0}")]
    NegativeOffset(i64),
    #[error("click mode must be 'template' or 'coordinates', got '{0}'")]
    UnknownClickMode(String),
    #[error("coordinates mode requires both x and y coordinates to be set")]
    MissingCoordinates,
    #[error("coordinates must be non-negative, got x={x}, y={y}")]
    NegativeCoordinates { x: i64, y: i64 },
    #[error("template image not found: {0}")]
    TemplateMissing(PathBuf),
    #[error("unsupported image format '{0}', use PNG, JPG or JPEG")]
    UnsupportedTemplateFormat(String),
}

/// Failure of a single device-channel operation.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("adb is not installed or not on PATH")]
    NotInstalled,
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("screen capture unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("no devices connected")]
    NoDevices,
    #[error("device index {index} out of range ({count} connected)")]
    NoSuchDevice { index: usize, count: usize },
    #[error("failed to clean {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which image failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Screen,
    Reference,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSource::Screen => f.write_str("screen capture"),
            ImageSource::Reference => f.write_str("reference image"),
        }
    }
}

/// A locate attempt that could not produce an answer. Distinct from a
/// capture that simply does not contain the target.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error(transparent)]
    CaptureUnavailable(#[from] DeviceError),
    #[error("failed to decode {source_kind}: {source}")]
    Decode {
        source_kind: ImageSource,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to read reference image {path}: {source}")]
    ReadReference {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reference image {template:?} is larger than the screen {screen:?}")]
    TemplateTooLarge {
        template: (u32, u32),
        screen: (u32, u32),
    },
}
