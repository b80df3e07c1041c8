use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::data::{Position, Project};
use super::settings::Settings;
use crate::error::PersistenceError;

/// Durable storage for project records and settings.
///
/// Both `save_projects` and `save_settings` are atomic: readers see either the
/// previous or the new state, never a mix.
pub trait ProjectStore: Send {
    fn load_projects(&self) -> Result<Vec<Project>, PersistenceError>;
    fn save_projects(&mut self, projects: &[Project]) -> Result<(), PersistenceError>;
    fn load_settings(&self) -> Result<Settings, PersistenceError>;
    fn save_settings(&mut self, settings: &Settings) -> Result<(), PersistenceError>;
}

/// The Library manages the SQLite catalog database.
/// It stores project records and the watcher settings.
pub struct Library {
    conn: Connection,
    db_path: PathBuf,
}

impl Library {
    /// Open (or create) the catalog at `db_path` and initialize the schema.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let db_path = db_path.into();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;

        info!("📁 Catalog opened at: {}", db_path.display());

        let library = Library { conn, db_path };
        library.init_schema()?;

        Ok(library)
    }

    /// Catalog that lives only as long as the process (tests, dry runs)
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let library = Library {
            conn: Connection::open_in_memory()?,
            db_path: PathBuf::from(":memory:"),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Get the default catalog location inside the data directory
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("canvas_warden.db")
    }

    /// Initialize the database schema.
    /// Creates all necessary tables if they don't exist.
    fn init_schema(&self) -> Result<(), PersistenceError> {
        // `position` keeps the sweep order stable across restarts
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS projects (
                name                        TEXT PRIMARY KEY,
                position                    INTEGER NOT NULL,
                track                       INTEGER NOT NULL,
                check_transparent_pixels    INTEGER NOT NULL,
                last_checked                TEXT NOT NULL DEFAULT '',
                griefed                     INTEGER NOT NULL DEFAULT 0,
                image_source                TEXT NOT NULL,
                start_x                     INTEGER NOT NULL,
                start_y                     INTEGER NOT NULL,
                end_x                       INTEGER NOT NULL,
                end_y                       INTEGER NOT NULL
            )",
            [],
        )?;

        // Single-row table holding the settings as JSON
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                id              INTEGER PRIMARY KEY CHECK (id = 1),
                settings_json   TEXT NOT NULL
            )",
            [],
        )?;

        debug!("✅ Catalog schema initialized");

        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }
}

impl ProjectStore for Library {
    /// Get all projects in insertion order
    fn load_projects(&self) -> Result<Vec<Project>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, track, check_transparent_pixels, last_checked, griefed,
                    image_source, start_x, start_y, end_x, end_y
             FROM projects ORDER BY position",
        )?;

        let project_iter = stmt.query_map([], |row| {
            Ok(Project {
                name: row.get(0)?,
                track: row.get(1)?,
                check_transparent_pixels: row.get(2)?,
                last_checked: row.get(3)?,
                griefed: row.get(4)?,
                image_source: row.get(5)?,
                start: Position { x: row.get(6)?, y: row.get(7)? },
                end: Position { x: row.get(8)?, y: row.get(9)? },
            })
        })?;

        let mut projects = Vec::new();
        for project in project_iter {
            projects.push(project?);
        }

        Ok(projects)
    }

    /// Replace the stored projects with `projects` in one transaction
    fn save_projects(&mut self, projects: &[Project]) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM projects", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO projects (name, position, track, check_transparent_pixels,
                                       last_checked, griefed, image_source,
                                       start_x, start_y, end_x, end_y)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for (position, project) in projects.iter().enumerate() {
                insert.execute(params![
                    project.name,
                    position as i64,
                    project.track,
                    project.check_transparent_pixels,
                    project.last_checked,
                    project.griefed,
                    project.image_source,
                    project.start.x,
                    project.start.y,
                    project.end.x,
                    project.end.y,
                ])?;
            }
        }
        tx.commit()?;

        debug!("💾 Saved {} projects", projects.len());
        Ok(())
    }

    /// Stored settings, or the defaults when none were saved yet
    fn load_settings(&self) -> Result<Settings, PersistenceError> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT settings_json FROM settings WHERE id = 1", [], |row| row.get(0))
            .optional()?;

        match json {
            Some(json) => Ok(Settings::from_json(&json)?),
            None => Ok(Settings::default()),
        }
    }

    fn save_settings(&mut self, settings: &Settings) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO settings (id, settings_json) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET settings_json = excluded.settings_json",
            params![settings.to_json()?],
        )?;
        Ok(())
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(name: &str) -> Project {
        Project::new(
            name,
            "https://backend.wplace.live/files/s0/tiles/10/20.png",
            Position::new(1, 2),
            Position::new(5, 6),
        )
    }

    #[test]
    fn test_projects_round_trip_in_order() {
        let mut library = Library::open_in_memory().unwrap();
        let mut b = project("b-second");
        b.griefed = true;
        b.last_checked = "2026-01-01 00:00:00".into();
        let projects = vec![project("z-first"), b];

        library.save_projects(&projects).unwrap();
        assert_eq!(library.load_projects().unwrap(), projects);

        // Saving replaces, never appends
        library.save_projects(&projects[..1]).unwrap();
        assert_eq!(library.load_projects().unwrap().len(), 1);
    }

    #[test]
    fn test_settings_default_then_saved() {
        let mut library = Library::open_in_memory().unwrap();
        assert_eq!(library.load_settings().unwrap(), Settings::default());

        let settings = Settings { automated_checks: true, cooldown_secs: 42, ..Default::default() };
        library.save_settings(&settings).unwrap();
        library.save_settings(&settings).unwrap();
        assert_eq!(library.load_settings().unwrap(), settings);
    }

    #[test]
    fn test_catalog_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = Library::default_path(dir.path());
        {
            let mut library = Library::open(&path).unwrap();
            library.save_projects(&[project("kept")]).unwrap();
        }
        let library = Library::open(&path).unwrap();
        assert_eq!(library.load_projects().unwrap()[0].name, "kept");
        assert_eq!(library.path(), &path);
    }
}
