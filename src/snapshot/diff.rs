/// Pixel-level change detection between two snapshots
///
/// A diff runs in two stages:
/// 1. A cheap identity test: mean squared error over every channel of every
///    pixel, compared against a similarity threshold (0.0 = exact match).
/// 2. Only when that test fails, a row-major enumeration of every pixel whose
///    RGBA differs, after the transparency rules below.
///
/// Transparency: the RGB under a fully transparent pixel is undefined, so
/// whenever alpha is 0 the color is normalized to (0,0,0,0) before comparing.
/// Projects that opt out of checking transparent pixels additionally ignore
/// every pixel that is transparent in the reference (outside the artwork).

use image::{DynamicImage, GenericImageView, Rgba};

use crate::error::{RasterShape, ShapeMismatchError};

/// Fully transparent, normalized
pub const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// One pixel that differs from the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedPixel {
    /// Position inside the watched region
    pub x: u32,
    pub y: u32,
    /// Reference color (the one to restore)
    pub old: Rgba<u8>,
    /// Color found on the canvas now
    pub new: Rgba<u8>,
}

/// Comparison options for one project
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffOptions {
    /// MSE at or below which the snapshots count as identical
    pub threshold: f64,
    /// Compare pixels that are transparent in the reference
    pub check_transparent: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self { threshold: 0.0, check_transparent: false }
    }
}

/// Result of comparing two same-shaped snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct DiffReport {
    /// Mean squared error over all channels and pixels
    pub mse: f64,
    /// Changed pixels in row-major order; empty when identical
    pub changes: Vec<ChangedPixel>,
}

/// Width, height and channel layout of a raster
pub fn shape_of(raster: &DynamicImage) -> RasterShape {
    let color = raster.color();
    RasterShape {
        width: raster.width(),
        height: raster.height(),
        channels: color.channel_count(),
        bytes_per_pixel: color.bytes_per_pixel(),
    }
}

/// Mean squared error over the raw channel values of two same-shaped rasters
pub fn mean_squared_error(reference: &DynamicImage, latest: &DynamicImage) -> Result<f64, ShapeMismatchError> {
    check_shapes(reference, latest)?;

    let (a, b) = (reference.as_bytes(), latest.as_bytes());
    if a.is_empty() {
        return Ok(0.0);
    }

    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum();

    Ok(sum / a.len() as f64)
}

/// Compare the latest snapshot against the reference.
///
/// Shape mismatch is an error, never an empty or full diff.
pub fn diff(
    reference: &DynamicImage,
    latest: &DynamicImage,
    options: DiffOptions,
) -> Result<DiffReport, ShapeMismatchError> {
    let mse = mean_squared_error(reference, latest)?;
    if mse <= options.threshold {
        return Ok(DiffReport { mse, changes: Vec::new() });
    }

    // `pixels()` walks rows top to bottom, left to right
    let changes = reference
        .pixels()
        .zip(latest.pixels())
        .filter_map(|((x, y, old), (_, _, new))| {
            if !options.check_transparent && old[3] == 0 {
                return None;
            }
            let (old, new) = (normalize(old), normalize(new));
            (old != new).then_some(ChangedPixel { x, y, old, new })
        })
        .collect();

    Ok(DiffReport { mse, changes })
}

/// Map every fully transparent color to (0,0,0,0)
pub fn normalize(rgba: Rgba<u8>) -> Rgba<u8> {
    if rgba[3] == 0 {
        CLEAR
    } else {
        rgba
    }
}

fn check_shapes(reference: &DynamicImage, latest: &DynamicImage) -> Result<(), ShapeMismatchError> {
    let (reference, latest) = (shape_of(reference), shape_of(latest));
    if reference == latest {
        Ok(())
    } else {
        Err(ShapeMismatchError { reference, latest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{RgbImage, RgbaImage};

    const RED: Rgba<u8> = Rgba([237, 28, 36, 255]);

    fn filled(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_pixel(width, height, color)
    }

    fn checking() -> DiffOptions {
        DiffOptions { threshold: 0.0, check_transparent: true }
    }

    #[test]
    fn test_identical_rasters() {
        let a = DynamicImage::ImageRgba8(RgbaImage::from_fn(5, 4, |x, y| Rgba([x as u8, y as u8, 9, 255])));
        for options in [checking(), DiffOptions::default()] {
            let report = diff(&a, &a.clone(), options).unwrap();
            assert!(report.changes.is_empty());
            assert_eq!(report.mse, 0.0);
        }
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let a = DynamicImage::ImageRgba8(filled(2, 2, RED));
        let b = DynamicImage::ImageRgba8(filled(2, 3, RED));
        let err = diff(&a, &b, checking()).unwrap_err();
        assert_eq!(err.reference.height, 2);
        assert_eq!(err.latest.height, 3);

        // Same size, different channel layout
        let rgb = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        assert!(diff(&a, &rgb, checking()).is_err());
    }

    #[test]
    fn test_single_changed_pixel() {
        let reference = DynamicImage::ImageRgba8(filled(2, 2, RED));
        let mut latest = filled(2, 2, RED);
        latest.put_pixel(0, 0, Rgba([1, 2, 3, 255]));

        let report = diff(&reference, &DynamicImage::ImageRgba8(latest), checking()).unwrap();
        assert_eq!(
            report.changes,
            vec![ChangedPixel { x: 0, y: 0, old: RED, new: Rgba([1, 2, 3, 255]) }]
        );
        assert!(report.mse > 0.0);
    }

    #[test]
    fn test_row_major_order() {
        let reference = DynamicImage::ImageRgba8(filled(3, 3, RED));
        let mut latest = filled(3, 3, RED);
        for (x, y) in [(2, 2), (0, 1), (2, 0), (1, 1), (0, 0)] {
            latest.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }

        let report = diff(&reference, &DynamicImage::ImageRgba8(latest), checking()).unwrap();
        let order: Vec<_> = report.changes.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(order, vec![(0, 0), (2, 0), (0, 1), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_transparent_noise_is_ignored() {
        let reference = DynamicImage::ImageRgba8(filled(2, 2, Rgba([10, 20, 30, 0])));
        let latest = DynamicImage::ImageRgba8(filled(2, 2, Rgba([99, 1, 250, 0])));

        // The raw bytes differ, so the identity test fails and enumeration runs
        for options in [DiffOptions::default(), checking()] {
            let report = diff(&reference, &latest, options).unwrap();
            assert!(report.mse > 0.0);
            assert!(report.changes.is_empty());
        }
    }

    #[test]
    fn test_paint_over_transparent_reference() {
        let reference = DynamicImage::ImageRgba8(filled(1, 1, Rgba([5, 5, 5, 0])));
        let latest = DynamicImage::ImageRgba8(filled(1, 1, RED));

        // Outside the artwork: ignored unless the project checks transparency
        assert!(diff(&reference, &latest, DiffOptions::default()).unwrap().changes.is_empty());

        let report = diff(&reference, &latest, checking()).unwrap();
        assert_eq!(report.changes, vec![ChangedPixel { x: 0, y: 0, old: CLEAR, new: RED }]);
    }

    #[test]
    fn test_erased_pixel_is_detected_either_way() {
        let reference = DynamicImage::ImageRgba8(filled(1, 1, RED));
        let latest = DynamicImage::ImageRgba8(filled(1, 1, Rgba([7, 7, 7, 0])));
        for options in [DiffOptions::default(), checking()] {
            let report = diff(&reference, &latest, options).unwrap();
            assert_eq!(report.changes, vec![ChangedPixel { x: 0, y: 0, old: RED, new: CLEAR }]);
        }
    }

    #[test]
    fn test_threshold_tolerates_small_error() {
        let reference = DynamicImage::ImageRgba8(filled(2, 2, RED));
        let mut latest = filled(2, 2, RED);
        latest.put_pixel(1, 1, Rgba([237, 28, 38, 255]));
        let latest = DynamicImage::ImageRgba8(latest);

        // One channel off by 2 over 16 channel values: MSE = 4 / 16
        let mse = mean_squared_error(&reference, &latest).unwrap();
        assert!((mse - 0.25).abs() < f64::EPSILON);

        let lenient = DiffOptions { threshold: 0.25, check_transparent: true };
        assert!(diff(&reference, &latest, lenient).unwrap().changes.is_empty());
        assert_eq!(diff(&reference, &latest, checking()).unwrap().changes.len(), 1);
    }

    #[test]
    fn test_empty_region() {
        let a = DynamicImage::ImageRgba8(RgbaImage::new(0, 0));
        assert!(diff(&a, &a.clone(), checking()).unwrap().changes.is_empty());
    }
}
