/// Canvas palette utilities
///
/// This module owns the fixed, ordered color palette of the canvas:
/// - The canonical color table (ordinal = position, an external contract)
/// - Exact RGBA → palette entry lookup
/// - Per-color ownership (free vs. restricted) with a sparse override file
///
/// The ordinal of a color is embedded in every generated patch script.
/// Reordering `PALETTE` breaks scripts that were already emitted, so new
/// colors may only ever be appended.

use image::Rgba;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PersistenceError, ValidationError};

/// One color of the canonical palette
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteEntry {
    /// Unique uppercase name (e.g. "RED")
    pub name: &'static str,
    /// Canonical RGBA; alpha is 255 for every color except TRANSPARENT
    pub rgba: [u8; 4],
    /// Whether the color is freely usable when no override exists
    pub free_by_default: bool,
}

const fn entry(name: &'static str, r: u8, g: u8, b: u8, a: u8, free: bool) -> PaletteEntry {
    PaletteEntry { name, rgba: [r, g, b, a], free_by_default: free }
}

/// The canonical palette, in ordinal order
pub const PALETTE: [PaletteEntry; 64] = [
    entry("TRANSPARENT", 0, 0, 0, 0, true),
    entry("BLACK", 0, 0, 0, 255, true),
    entry("DARK_GRAY", 60, 60, 60, 255, true),
    entry("GRAY", 120, 120, 120, 255, true),
    entry("LIGHT_GRAY", 210, 210, 210, 255, true),
    entry("WHITE", 255, 255, 255, 255, true),
    entry("DEEP_RED", 96, 0, 24, 255, true),
    entry("RED", 237, 28, 36, 255, true),
    entry("ORANGE", 255, 127, 39, 255, true),
    entry("GOLD", 246, 170, 9, 255, true),
    entry("YELLOW", 249, 221, 59, 255, true),
    entry("LIGHT_YELLOW", 255, 250, 188, 255, true),
    entry("DARK_GREEN", 14, 185, 104, 255, true),
    entry("GREEN", 19, 230, 123, 255, true),
    entry("LIGHT_GREEN", 135, 255, 94, 255, true),
    entry("DARK_TEAL", 12, 129, 110, 255, true),
    entry("TEAL", 16, 174, 166, 255, true),
    entry("LIGHT_TEAL", 19, 225, 190, 255, true),
    entry("DARK_BLUE", 40, 80, 158, 255, true),
    entry("BLUE", 64, 147, 228, 255, true),
    entry("CYAN", 96, 247, 242, 255, true),
    entry("INDIGO", 107, 80, 246, 255, true),
    entry("LIGHT_INDIGO", 153, 177, 251, 255, true),
    entry("DARK_PURPLE", 120, 12, 153, 255, true),
    entry("PURPLE", 170, 56, 185, 255, true),
    entry("LIGHT_PURPLE", 224, 159, 249, 255, true),
    entry("DARK_PINK", 203, 0, 122, 255, true),
    entry("PINK", 236, 31, 128, 255, true),
    entry("LIGHT_PINK", 243, 141, 169, 255, true),
    entry("DARK_BROWN", 104, 70, 52, 255, true),
    entry("BROWN", 149, 104, 42, 255, true),
    entry("BEIGE", 248, 178, 119, 255, true),
    entry("MEDIUM_GRAY", 170, 170, 170, 255, false),
    entry("DARK_RED", 165, 14, 30, 255, false),
    entry("LIGHT_RED", 250, 128, 114, 255, false),
    entry("DARK_ORANGE", 228, 92, 26, 255, false),
    entry("LIGHT_TAN", 214, 181, 148, 255, false),
    entry("DARK_GOLDENROD", 156, 132, 49, 255, false),
    entry("GOLDENROD", 197, 173, 49, 255, false),
    entry("LIGHT_GOLDENROD", 232, 212, 95, 255, false),
    entry("DARK_OLIVE", 74, 107, 58, 255, false),
    entry("OLIVE", 90, 148, 74, 255, false),
    entry("LIGHT_OLIVE", 132, 197, 115, 255, false),
    entry("DARK_CYAN", 15, 121, 159, 255, false),
    entry("LIGHT_CYAN", 187, 250, 242, 255, false),
    entry("LIGHT_BLUE", 125, 199, 255, 255, false),
    entry("DARK_INDIGO", 77, 49, 184, 255, false),
    entry("DARK_SLATE_BLUE", 74, 66, 132, 255, false),
    entry("SLATE_BLUE", 122, 113, 196, 255, false),
    entry("LIGHT_SLATE_BLUE", 181, 174, 241, 255, false),
    entry("LIGHT_BROWN", 219, 164, 99, 255, false),
    entry("DARK_BEIGE", 209, 128, 81, 255, false),
    entry("LIGHT_BEIGE", 255, 197, 165, 255, false),
    entry("DARK_PEACH", 155, 82, 73, 255, false),
    entry("PEACH", 209, 128, 120, 255, false),
    entry("LIGHT_PEACH", 250, 182, 164, 255, false),
    entry("DARK_TAN", 123, 99, 82, 255, false),
    entry("TAN", 156, 132, 107, 255, false),
    entry("DARK_SLATE", 51, 57, 65, 255, false),
    entry("SLATE", 109, 117, 141, 255, false),
    entry("LIGHT_SLATE", 179, 185, 209, 255, false),
    entry("DARK_STONE", 109, 100, 63, 255, false),
    entry("STONE", 148, 140, 107, 255, false),
    entry("LIGHT_STONE", 205, 197, 158, 255, false),
];

/// Result of a palette lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorMatch {
    pub name: &'static str,
    pub ordinal: usize,
    /// Effective ownership: defaults overlaid with user overrides
    pub owned: bool,
}

/// Palette entry together with its effective ownership (for listings)
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ColorSetting {
    pub name: &'static str,
    pub ordinal: usize,
    pub rgba: [u8; 4],
    pub enabled: bool,
    pub overridden: bool,
}

/// Palette lookup with a sparse ownership overlay.
///
/// The overlay only stores colors whose ownership was explicitly set, so
/// colors appended to `PALETTE` later need no migration of the file.
#[derive(Debug, Clone, Default)]
pub struct PaletteIndex {
    overrides: BTreeMap<String, bool>,
    config_path: Option<PathBuf>,
}

impl PaletteIndex {
    /// Palette with default ownership and no backing file
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from a JSON file. A missing file means "no overrides".
    pub fn load(config_path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let config_path = config_path.into();
        let overrides = match fs::read_to_string(&config_path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("🎨 Loaded {} palette overrides from {}", overrides.len(), config_path.display());

        Ok(Self { overrides, config_path: Some(config_path) })
    }

    /// Write the overlay back to its file (no-op for in-memory palettes)
    pub fn save(&self) -> Result<(), PersistenceError> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.overrides)?)?;
        info!("💾 Saved palette overrides to {}", path.display());
        Ok(())
    }

    /// Path of the backing override file, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Exact match on all four channels. No nearest-color fallback.
    pub fn lookup(&self, rgba: Rgba<u8>) -> Option<ColorMatch> {
        PALETTE
            .iter()
            .position(|entry| entry.rgba == rgba.0)
            .map(|ordinal| {
                let entry = &PALETTE[ordinal];
                ColorMatch { name: entry.name, ordinal, owned: self.is_owned(entry) }
            })
    }

    /// Find a palette entry by name
    pub fn by_name(name: &str) -> Option<(usize, &'static PaletteEntry)> {
        PALETTE.iter().enumerate().find(|(_, entry)| entry.name == name)
    }

    /// Override the ownership of one color
    pub fn set_override(&mut self, name: &str, owned: bool) -> Result<(), ValidationError> {
        if Self::by_name(name).is_none() {
            return Err(ValidationError::UnknownColor(name.to_string()));
        }
        self.overrides.insert(name.to_string(), owned);
        Ok(())
    }

    /// Drop the override of one color, or of every color when `name` is None
    pub fn reset(&mut self, name: Option<&str>) {
        match name {
            Some(name) => {
                self.overrides.remove(name);
            }
            None => self.overrides.clear(),
        }
    }

    /// Every palette color with its effective ownership, in ordinal order
    pub fn entries(&self) -> Vec<ColorSetting> {
        PALETTE
            .iter()
            .enumerate()
            .map(|(ordinal, entry)| ColorSetting {
                name: entry.name,
                ordinal,
                rgba: entry.rgba,
                enabled: self.is_owned(entry),
                overridden: self.overrides.contains_key(entry.name),
            })
            .collect()
    }

    fn is_owned(&self, entry: &PaletteEntry) -> bool {
        self.overrides
            .get(entry.name)
            .copied()
            .unwrap_or(entry.free_by_default)
    }
}

/// Human readable palette label for a color: `RED(7)`, or the raw quad when
/// the color is not in the palette.
pub fn describe(palette: &PaletteIndex, rgba: Rgba<u8>) -> String {
    match palette.lookup(rgba) {
        Some(found) => format!("{}({})", found.name, found.ordinal),
        None => {
            let [r, g, b, a] = rgba.0;
            format!("rgba({r},{g},{b},{a})(?)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_entry_resolves_to_its_ordinal() {
        let palette = PaletteIndex::new();
        for (ordinal, entry) in PALETTE.iter().enumerate() {
            let found = palette.lookup(Rgba(entry.rgba)).unwrap();
            assert_eq!(found.name, entry.name);
            assert_eq!(found.ordinal, ordinal);
            // Repeated lookups are stable
            assert_eq!(palette.lookup(Rgba(entry.rgba)), Some(found));
        }
    }

    #[test]
    fn test_palette_names_and_colors_are_unique() {
        for (i, a) in PALETTE.iter().enumerate() {
            for b in &PALETTE[i + 1..] {
                assert_ne!(a.name, b.name);
                assert_ne!(a.rgba, b.rgba);
            }
        }
    }

    #[test]
    fn test_known_ordinals() {
        let palette = PaletteIndex::new();
        let red = palette.lookup(Rgba([237, 28, 36, 255])).unwrap();
        assert_eq!((red.name, red.ordinal, red.owned), ("RED", 7, true));

        let transparent = palette.lookup(Rgba([0, 0, 0, 0])).unwrap();
        assert_eq!(transparent.ordinal, 0);

        let stone = palette.lookup(Rgba([148, 140, 107, 255])).unwrap();
        assert_eq!((stone.name, stone.ordinal, stone.owned), ("STONE", 62, false));
    }

    #[test]
    fn test_lookup_is_exact() {
        let palette = PaletteIndex::new();
        assert!(palette.lookup(Rgba([237, 28, 35, 255])).is_none());
        // Same RGB as RED but not opaque
        assert!(palette.lookup(Rgba([237, 28, 36, 254])).is_none());
        assert!(palette.lookup(Rgba([1, 2, 3, 255])).is_none());
    }

    #[test]
    fn test_override_and_reset() {
        let mut palette = PaletteIndex::new();
        palette.set_override("RED", false).unwrap();
        palette.set_override("STONE", true).unwrap();
        assert!(!palette.lookup(Rgba([237, 28, 36, 255])).unwrap().owned);
        assert!(palette.lookup(Rgba([148, 140, 107, 255])).unwrap().owned);

        palette.reset(Some("RED"));
        assert!(palette.lookup(Rgba([237, 28, 36, 255])).unwrap().owned);
        assert!(palette.lookup(Rgba([148, 140, 107, 255])).unwrap().owned);

        palette.reset(None);
        assert!(!palette.lookup(Rgba([148, 140, 107, 255])).unwrap().owned);
    }

    #[test]
    fn test_unknown_override_is_rejected() {
        let mut palette = PaletteIndex::new();
        assert_eq!(
            palette.set_override("CHARTREUSE", true),
            Err(ValidationError::UnknownColor("CHARTREUSE".into()))
        );
    }

    #[test]
    fn test_overrides_persist_sparsely() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("color_config.json");

        let mut palette = PaletteIndex::load(&path).unwrap();
        palette.set_override("GOLD", false).unwrap();
        palette.save().unwrap();

        let stored: BTreeMap<String, bool> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.get("GOLD"), Some(&false));

        let reloaded = PaletteIndex::load(&path).unwrap();
        assert!(!reloaded.lookup(Rgba([246, 170, 9, 255])).unwrap().owned);
        let listing = reloaded.entries();
        assert_eq!(listing.len(), PALETTE.len());
        assert!(listing[9].overridden && !listing[9].enabled);
    }

    #[test]
    fn test_describe() {
        let palette = PaletteIndex::new();
        assert_eq!(describe(&palette, Rgba([0, 0, 0, 255])), "BLACK(1)");
        assert_eq!(describe(&palette, Rgba([1, 2, 3, 255])), "rgba(1,2,3,255)(?)");
    }
}
