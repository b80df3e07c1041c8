/// Shared data structures for the watcher state
///
/// These structs represent the project records that flow between
/// the catalog, the scheduler and the command line.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{FieldError, ValidationError};
use crate::patch::parse_tile_coords;

/// Longest accepted project name
const MAX_NAME_LEN: usize = 200;

/// A pixel position, either inside a tile or inside a watched region
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// A watched artwork: one rectangular region of one canvas tile
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Unique name, also used as the artifact directory name
    pub name: String,
    /// Include in the automatic sweep and send alerts
    pub track: bool,
    /// Compare pixels that are transparent in the reference snapshot
    pub check_transparent_pixels: bool,
    /// Local time of the last completed check (`YYYY-MM-DD HH:MM:SS`), empty if never
    #[serde(default)]
    pub last_checked: String,
    /// The region currently differs from its reference
    #[serde(default)]
    pub griefed: bool,
    /// Tile image URL; encodes the tile coordinates (`.../tiles/<x>/<y>.png`)
    #[serde(alias = "api_image")]
    pub image_source: String,
    /// Top-left corner of the region (inclusive)
    #[serde(alias = "start_coords")]
    pub start: Position,
    /// Bottom-right corner of the region (exclusive)
    #[serde(alias = "end_coords")]
    pub end: Position,
}

impl Project {
    /// Create an untracked, clean project record
    pub fn new(name: impl Into<String>, image_source: impl Into<String>, start: Position, end: Position) -> Self {
        Self {
            name: name.into(),
            track: false,
            check_transparent_pixels: false,
            last_checked: String::new(),
            griefed: false,
            image_source: image_source.into(),
            start,
            end,
        }
    }

    /// Width and height of the watched region
    pub fn region_size(&self) -> (u32, u32) {
        (
            self.end.x.saturating_sub(self.start.x),
            self.end.y.saturating_sub(self.start.y),
        )
    }

    /// Check every field, reporting all offending ones together
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.name.is_empty() || self.name.chars().count() > MAX_NAME_LEN {
            errors.push(FieldError {
                field: "name",
                reason: format!("must be 1-{MAX_NAME_LEN} characters"),
            });
        } else if !name_pattern().is_match(&self.name) {
            errors.push(FieldError {
                field: "name",
                reason: "may only contain letters, digits, spaces, '_' and '-'".into(),
            });
        }

        if !self.image_source.starts_with("http://") && !self.image_source.starts_with("https://") {
            errors.push(FieldError {
                field: "image_source",
                reason: "must be an http(s) URL".into(),
            });
        } else if parse_tile_coords(&self.image_source).is_none() {
            errors.push(FieldError {
                field: "image_source",
                reason: "must end in /tiles/<x>/<y>.png".into(),
            });
        }

        if self.end.x < self.start.x {
            errors.push(FieldError { field: "end.x", reason: "must be >= start.x".into() });
        }
        if self.end.y < self.start.y {
            errors.push(FieldError { field: "end.y", reason: "must be >= start.y".into() });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Fields(errors))
        }
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_\- ]+$").expect("static pattern"))
}

/// Partial update of a project record. `None` leaves the field untouched.
///
/// State owned by the watcher itself (griefed, last_checked) is not editable.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectEdit {
    pub track: Option<bool>,
    pub check_transparent_pixels: Option<bool>,
    pub image_source: Option<String>,
    pub start: Option<Position>,
    pub end: Option<Position>,
}

impl ProjectEdit {
    /// Apply to a copy of `project` and validate the result.
    ///
    /// The original record is never touched, so a rejected edit leaves no
    /// partial changes behind.
    pub fn apply(&self, project: &Project) -> Result<Project, ValidationError> {
        let mut edited = project.clone();
        if let Some(track) = self.track {
            edited.track = track;
        }
        if let Some(check) = self.check_transparent_pixels {
            edited.check_transparent_pixels = check;
        }
        if let Some(source) = &self.image_source {
            edited.image_source = source.clone();
        }
        if let Some(start) = self.start {
            edited.start = start;
        }
        if let Some(end) = self.end {
            edited.end = end;
        }
        edited.validate()?;
        Ok(edited)
    }

    /// Whether the edit moves the watched pixels (the old reference is then stale)
    pub fn changes_region(&self, project: &Project) -> bool {
        self.image_source.as_ref().is_some_and(|s| *s != project.image_source)
            || self.start.is_some_and(|p| p != project.start)
            || self.end.is_some_and(|p| p != project.end)
    }
}
