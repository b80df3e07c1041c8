/// Patch synthesis
///
/// Turns the changed pixels of a diff into an ordered list of paint
/// instructions that restore the reference colors, plus the logs that explain
/// what was found and what could not be restored.
///
/// Synthesis always emits the full valid instruction list. The client that
/// executes the script applies only as many instructions as it has charges,
/// so instruction order (row-major diff order) is the priority order.

pub mod script;

use image::Rgba;
use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

use crate::color::{describe, PaletteIndex};
use crate::snapshot::diff::{normalize, ChangedPixel};
use crate::state::data::Position;

pub use script::render_script;

/// Edge length of a canvas tile, in pixels
pub const TILE_SIZE: u32 = 1000;

/// Integer coordinates of a canvas tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoords {
    pub x: u32,
    pub y: u32,
}

/// Extract the tile coordinates from a tile image URL (`.../tiles/<x>/<y>.png`).
///
/// Returns None instead of guessing: a wrong tile would send the restore
/// script to the wrong place on the canvas.
pub fn parse_tile_coords(url: &str) -> Option<TileCoords> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"/tiles/(\d+)/(\d+)\.png(?:[?#].*)?$").expect("static pattern")
    });

    let captures = pattern.captures(url)?;
    Some(TileCoords {
        x: captures[1].parse().ok()?,
        y: captures[2].parse().ok()?,
    })
}

/// One pixel to repaint: position inside the tile, color and palette ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchInstruction {
    pub x: u32,
    pub y: u32,
    pub color: Rgba<u8>,
    pub ordinal: usize,
}

/// Why a changed pixel got no instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The reference color is not in the palette
    UnknownColor,
    /// The reference color is restricted; it is never auto-selected
    RestrictedColor { name: &'static str, ordinal: usize },
}

/// A changed pixel that was dropped from the patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedPixel {
    /// 1-based position in the changed-pixel list
    pub index: usize,
    pub pixel: ChangedPixel,
    pub reason: SkipReason,
}

/// Restore instructions for one check
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Patch {
    /// In changed-pixel order
    pub instructions: Vec<PatchInstruction>,
    pub skipped: Vec<SkippedPixel>,
}

impl Patch {
    /// Number of changed pixels this patch was built from
    pub fn input_count(&self) -> usize {
        self.instructions.len() + self.skipped.len()
    }

    /// One line per skipped pixel
    pub fn skip_log(&self) -> String {
        let total = self.input_count();
        let mut log = String::new();
        for skipped in &self.skipped {
            let ChangedPixel { x, y, old, .. } = skipped.pixel;
            let [r, g, b, a] = old.0;
            let _ = match skipped.reason {
                SkipReason::UnknownColor => writeln!(
                    log,
                    "⚠️ Skipping pixel {}/{} at ({x},{y}): unknown color rgba({r},{g},{b},{a})",
                    skipped.index, total
                ),
                SkipReason::RestrictedColor { name, ordinal } => writeln!(
                    log,
                    "⚠️ Skipping pixel {}/{} at ({x},{y}): restricted color {name}({ordinal})",
                    skipped.index, total
                ),
            };
        }
        log
    }
}

/// Build the restore patch for `changes`.
///
/// `offset` is the top-left corner of the watched region inside the tile.
/// Every changed pixel ends up either as an instruction or as a skip entry.
pub fn synthesize(changes: &[ChangedPixel], offset: Position, palette: &PaletteIndex) -> Patch {
    let mut patch = Patch::default();

    for (i, pixel) in changes.iter().enumerate() {
        let old = normalize(pixel.old);
        let reason = match palette.lookup(old) {
            None => SkipReason::UnknownColor,
            Some(found) if !found.owned => SkipReason::RestrictedColor {
                name: found.name,
                ordinal: found.ordinal,
            },
            Some(found) => {
                patch.instructions.push(PatchInstruction {
                    x: offset.x + pixel.x,
                    y: offset.y + pixel.y,
                    color: old,
                    ordinal: found.ordinal,
                });
                continue;
            }
        };
        patch.skipped.push(SkippedPixel { index: i + 1, pixel: *pixel, reason });
    }

    patch
}

/// Human readable change log: a header, one line per changed pixel in tile
/// coordinates, then the skip log.
pub fn render_change_log(
    changes: &[ChangedPixel],
    patch: &Patch,
    offset: Position,
    palette: &PaletteIndex,
) -> String {
    let mut log = format!("Detected {} changed pixels!\n", changes.len());
    for pixel in changes {
        let _ = writeln!(
            log,
            "({},{}) {} → {}",
            offset.x + pixel.x,
            offset.y + pixel.y,
            describe(palette, pixel.old),
            describe(palette, pixel.new)
        );
    }
    log.push_str(&patch.skip_log());
    log
}
