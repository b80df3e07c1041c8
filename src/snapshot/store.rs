use image::{DynamicImage, GenericImageView, ImageFormat};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::SnapshotError;
use crate::state::data::Position;

/// Reference ("known-good") snapshot file name
const REFERENCE_FILE: &str = "original.png";
/// Latest fetched snapshot file name
const LATEST_FILE: &str = "new.png";
/// Plain-text change log of the last check
const CHANGE_LOG_FILE: &str = "changes.log";
/// Client-executable restore script of the last griefed check
const SCRIPT_FILE: &str = "fix_pixels.js";

/// Decode fetched tile bytes. The pixel layout of the file is kept as-is.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, SnapshotError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Extract the region `[start, end)` without resampling or blending.
///
/// A region that does not fit inside the raster is an error; it is never
/// padded or clamped, since either would make the diff meaningless.
pub fn crop(raster: &DynamicImage, start: Position, end: Position) -> Result<DynamicImage, SnapshotError> {
    let (width, height) = raster.dimensions();
    if end.x < start.x || end.y < start.y || end.x > width || end.y > height {
        return Err(SnapshotError::RegionOutOfBounds {
            x0: start.x,
            y0: start.y,
            x1: end.x,
            y1: end.y,
            width,
            height,
        });
    }
    Ok(raster.crop_imm(start.x, start.y, end.x - start.x, end.y - start.y))
}

/// Per-project snapshot and artifact storage.
///
/// Layout: `<root>/<project name>/{original.png, new.png, changes.log, fix_pixels.js}`
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one project's files
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.root.join(project)
    }

    pub fn reference_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join(REFERENCE_FILE)
    }

    pub fn latest_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join(LATEST_FILE)
    }

    pub fn change_log_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join(CHANGE_LOG_FILE)
    }

    pub fn script_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join(SCRIPT_FILE)
    }

    /// Load the reference snapshot, or None when no baseline exists yet
    pub fn reference(&self, project: &str) -> Result<Option<DynamicImage>, SnapshotError> {
        let path = self.reference_path(project);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(image::load_from_memory_with_format(&bytes, ImageFormat::Png)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_reference(&self, project: &str, raster: &DynamicImage) -> Result<PathBuf, SnapshotError> {
        let path = self.reference_path(project);
        self.save_png(&path, raster)?;
        info!("📸 Baseline snapshot saved: {}", path.display());
        Ok(path)
    }

    pub fn save_latest(&self, project: &str, raster: &DynamicImage) -> Result<PathBuf, SnapshotError> {
        let path = self.latest_path(project);
        self.save_png(&path, raster)?;
        Ok(path)
    }

    /// Overwrite the change log with a timestamp header and `body`
    pub fn write_change_log(&self, project: &str, checked_at: &str, body: &str) -> Result<PathBuf, SnapshotError> {
        let path = self.change_log_path(project);
        self.ensure_dir(project)?;
        let body = if body.is_empty() { "No changes detected.\n" } else { body };
        fs::write(&path, format!("[{checked_at}]\n{body}"))?;
        Ok(path)
    }

    pub fn write_script(&self, project: &str, script: &str) -> Result<PathBuf, SnapshotError> {
        let path = self.script_path(project);
        self.ensure_dir(project)?;
        fs::write(&path, script)?;
        debug!("📝 Patch script written: {}", path.display());
        Ok(path)
    }

    /// Drop a stale restore script once the art is clean again
    pub fn clear_script(&self, project: &str) -> Result<(), SnapshotError> {
        remove_if_present(&self.script_path(project))
    }

    /// Forget the baseline; the next check records a new one
    pub fn discard_reference(&self, project: &str) -> Result<(), SnapshotError> {
        remove_if_present(&self.reference_path(project))
    }

    /// Delete every file of a project
    pub fn remove_project(&self, project: &str) -> Result<(), SnapshotError> {
        match fs::remove_dir_all(self.project_dir(project)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn ensure_dir(&self, project: &str) -> Result<(), SnapshotError> {
        fs::create_dir_all(self.project_dir(project))?;
        Ok(())
    }

    fn save_png(&self, path: &Path, raster: &DynamicImage) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        raster.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<(), SnapshotError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
