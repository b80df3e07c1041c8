/// Snapshot module
///
/// This module handles:
/// - Downloading tile images (fetch.rs)
/// - Decoding, cropping and storing reference/latest rasters (store.rs)
/// - Comparing the two rasters pixel by pixel (diff.rs)

pub mod diff;
pub mod fetch;
pub mod store;

pub use fetch::{Fetcher, HttpFetcher};
pub use store::SnapshotStore;
