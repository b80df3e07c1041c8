/// Error taxonomy for the watcher
///
/// Each concern gets its own enum so callers can tell a failed fetch from
/// incomparable snapshots from a bad project record. Unknown and restricted
/// palette colors are not errors; they end up in the patch skip log.

use std::fmt;
use thiserror::Error;

/// Failure to retrieve a tile image. Never retried.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request did not complete within the configured timeout
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The server answered with a non-success status
    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Connection, TLS or body read failure
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },
}

/// The reference and latest rasters cannot be compared pixel by pixel.
///
/// Distinct from "no differences": a mismatch never produces a diff result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("snapshot shapes differ: reference {reference}, latest {latest}")]
pub struct ShapeMismatchError {
    pub reference: RasterShape,
    pub latest: RasterShape,
}

/// Width, height and channel layout of a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterShape {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub bytes_per_pixel: u8,
}

impl fmt::Display for RasterShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} ({} channels, {} bytes/px)",
            self.width, self.height, self.channels, self.bytes_per_pixel
        )
    }
}

/// A single offending field of a project record or palette override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Malformed project record, unknown project or unknown palette color.
///
/// Carries every offending field so the caller can report them all at once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid record: {}", join_fields(.0))]
    Fields(Vec<FieldError>),

    #[error("project '{0}' already exists")]
    Duplicate(String),

    #[error("project '{0}' not found")]
    UnknownProject(String),

    #[error("color '{0}' is not in the palette")]
    UnknownColor(String),
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure writing or reading durable state
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("catalog error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reading, decoding or storing a snapshot raster
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("region {x0},{y0} → {x1},{y1} lies outside the {width}x{height} tile")]
    RegionOutOfBounds {
        x0: u32,
        y0: u32,
        x1: u32,
        y1: u32,
        width: u32,
        height: u32,
    },
}

/// Anything that aborts a single project's check cycle.
///
/// The scheduler logs these and moves on to the next project.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Shape(#[from] ShapeMismatchError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Notification delivery failure. Logged by the scheduler, never retried.
#[derive(Debug, Error)]
#[error("notification '{title}' not delivered: {reason}")]
pub struct NotifyError {
    pub title: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = ValidationError::Fields(vec![
            FieldError { field: "name", reason: "must not be empty".into() },
            FieldError { field: "end.x", reason: "must be >= start.x".into() },
        ]);
        let message = err.to_string();
        assert!(message.contains("name: must not be empty"));
        assert!(message.contains("end.x: must be >= start.x"));
    }

    #[test]
    fn test_shape_mismatch_message() {
        let shape = |w, h| RasterShape { width: w, height: h, channels: 4, bytes_per_pixel: 4 };
        let err = ShapeMismatchError { reference: shape(2, 2), latest: shape(3, 2) };
        assert_eq!(
            err.to_string(),
            "snapshot shapes differ: reference 2x2 (4 channels, 4 bytes/px), latest 3x2 (4 channels, 4 bytes/px)"
        );
    }
}
