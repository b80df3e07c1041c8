/// State management module
///
/// This module handles all watcher state, including:
/// - Project records and validation (data.rs)
/// - The SQLite catalog (library.rs)
/// - The locked in-memory registry (registry.rs)
/// - Watcher settings (settings.rs)
/// - The clean/griefed state machine (machine.rs)

pub mod data;
pub mod library;
pub mod machine;
pub mod registry;
pub mod settings;

pub use data::{Position, Project, ProjectEdit};
pub use library::Library;
pub use registry::Registry;
pub use settings::Settings;
