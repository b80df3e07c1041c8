use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use super::data::{Project, ProjectEdit};
use super::library::ProjectStore;
use super::settings::Settings;
use crate::error::{PersistenceError, ValidationError};

/// In-memory project registry mirrored to a `ProjectStore`.
///
/// Every read-modify-persist sequence runs under the registry's own lock, so a
/// manual check and the background sweep can never interleave their writes.
/// Writes re-read the store first, so records added by another process (the
/// command line next to a running watcher) are not overwritten. When
/// persisting fails the in-memory state is kept and the error is logged; the
/// next `reload` reconciles with whatever the store holds.
pub struct Registry {
    inner: Mutex<Inner>,
}

struct Inner {
    store: Box<dyn ProjectStore>,
    projects: Vec<Project>,
    settings: Settings,
}

impl Inner {
    fn persist_projects(&mut self) {
        if let Err(e) = self.store.save_projects(&self.projects) {
            error!("💥 Failed to persist projects (in-memory state kept): {}", e);
        }
    }

    /// Pick up records written by other processes before modifying them.
    /// On failure the in-memory copy is used as-is.
    fn refresh_projects(&mut self) {
        match self.store.load_projects() {
            Ok(projects) => self.projects = projects,
            Err(e) => warn!("⚠️  Could not re-read projects, using in-memory copy: {}", e),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.projects.iter().position(|p| p.name == name)
    }
}

impl Registry {
    /// Create a registry and load everything the store holds
    pub fn open(store: impl ProjectStore + 'static) -> Result<Self, PersistenceError> {
        let projects = store.load_projects()?;
        let settings = store.load_settings()?;

        info!("🎨 Registry loaded with {} projects", projects.len());

        Ok(Self {
            inner: Mutex::new(Inner { store: Box::new(store), projects, settings }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep going
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Discard in-memory state and re-read the store
    pub fn reload(&self) -> Result<(), PersistenceError> {
        let mut inner = self.lock();
        inner.projects = inner.store.load_projects()?;
        inner.settings = inner.store.load_settings()?;
        debug!("🔄 Registry reloaded ({} projects)", inner.projects.len());
        Ok(())
    }

    /// Snapshot of every project
    pub fn list(&self) -> Vec<Project> {
        self.lock().projects.clone()
    }

    /// Copy of one project
    pub fn get(&self, name: &str) -> Option<Project> {
        let inner = self.lock();
        inner.position(name).map(|i| inner.projects[i].clone())
    }

    /// Copy of one project as the store holds it now, so edits saved by
    /// another process since the last reload are seen
    pub fn get_fresh(&self, name: &str) -> Option<Project> {
        let mut inner = self.lock();
        inner.refresh_projects();
        inner.position(name).map(|i| inner.projects[i].clone())
    }

    /// Names of tracked projects, in registry order
    pub fn tracked_names(&self) -> Vec<String> {
        self.lock()
            .projects
            .iter()
            .filter(|p| p.track)
            .map(|p| p.name.clone())
            .collect()
    }

    /// Add a new project after validating it
    pub fn insert(&self, project: Project) -> Result<(), ValidationError> {
        project.validate()?;

        let mut inner = self.lock();
        inner.refresh_projects();
        if inner.position(&project.name).is_some() {
            return Err(ValidationError::Duplicate(project.name));
        }
        info!("➕ Added project {}", project.name);
        inner.projects.push(project);
        inner.persist_projects();
        Ok(())
    }

    /// Apply a partial edit; nothing changes unless the whole edit is valid
    pub fn edit(&self, name: &str, edit: &ProjectEdit) -> Result<Project, ValidationError> {
        let mut inner = self.lock();
        inner.refresh_projects();
        let index = inner
            .position(name)
            .ok_or_else(|| ValidationError::UnknownProject(name.to_string()))?;

        let edited = edit.apply(&inner.projects[index])?;
        inner.projects[index] = edited.clone();
        inner.persist_projects();
        Ok(edited)
    }

    /// Remove a project, returning its last record
    pub fn remove(&self, name: &str) -> Result<Project, ValidationError> {
        let mut inner = self.lock();
        inner.refresh_projects();
        let index = inner
            .position(name)
            .ok_or_else(|| ValidationError::UnknownProject(name.to_string()))?;

        let removed = inner.projects.remove(index);
        inner.persist_projects();
        info!("🗑️  Removed project {}", name);
        Ok(removed)
    }

    /// Read-modify-persist one project under the registry lock
    pub fn mutate<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Project) -> T,
    ) -> Result<T, ValidationError> {
        let mut inner = self.lock();
        inner.refresh_projects();
        let index = inner
            .position(name)
            .ok_or_else(|| ValidationError::UnknownProject(name.to_string()))?;

        let result = f(&mut inner.projects[index]);
        inner.persist_projects();
        Ok(result)
    }

    /// Current settings
    pub fn settings(&self) -> Settings {
        self.lock().settings.clone()
    }

    /// Read-modify-persist the settings
    pub fn update_settings(&self, f: impl FnOnce(&mut Settings)) -> Result<Settings, PersistenceError> {
        let mut inner = self.lock();
        let mut settings = inner.settings.clone();
        f(&mut settings);
        inner.settings = settings.clone();
        inner.store.save_settings(&settings)?;
        Ok(settings)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("projects", &self.lock().projects.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::state::data::Position;
    use crate::state::library::Library;

    pub(crate) fn project(name: &str, track: bool) -> Project {
        let mut project = Project::new(
            name,
            "https://backend.wplace.live/files/s0/tiles/1611/875.png",
            Position::new(0, 0),
            Position::new(2, 2),
        );
        project.track = track;
        project
    }

    /// Store whose writes always fail
    struct BrokenStore;

    impl ProjectStore for BrokenStore {
        fn load_projects(&self) -> Result<Vec<Project>, PersistenceError> {
            Ok(Vec::new())
        }
        fn save_projects(&mut self, _: &[Project]) -> Result<(), PersistenceError> {
            Err(PersistenceError::Io(std::io::Error::other("disk full")))
        }
        fn load_settings(&self) -> Result<Settings, PersistenceError> {
            Ok(Settings::default())
        }
        fn save_settings(&mut self, _: &Settings) -> Result<(), PersistenceError> {
            Err(PersistenceError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn test_insert_get_and_tracked_order() {
        let registry = Registry::open(Library::open_in_memory().unwrap()).unwrap();
        registry.insert(project("b", true)).unwrap();
        registry.insert(project("a", false)).unwrap();
        registry.insert(project("c", true)).unwrap();

        assert_eq!(registry.tracked_names(), vec!["b", "c"]);
        assert_eq!(registry.get("a").unwrap().name, "a");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_and_invalid_rejected() {
        let registry = Registry::open(Library::open_in_memory().unwrap()).unwrap();
        registry.insert(project("a", true)).unwrap();
        assert_eq!(
            registry.insert(project("a", true)),
            Err(ValidationError::Duplicate("a".into()))
        );

        let mut bad = project("b", true);
        bad.end = Position::new(0, 0);
        bad.start = Position::new(5, 5);
        assert!(matches!(registry.insert(bad), Err(ValidationError::Fields(_))));
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_rejected_edit_changes_nothing() {
        let registry = Registry::open(Library::open_in_memory().unwrap()).unwrap();
        registry.insert(project("a", false)).unwrap();

        let edit = ProjectEdit {
            track: Some(true),
            image_source: Some("not a url".into()),
            ..Default::default()
        };
        assert!(registry.edit("a", &edit).is_err());
        assert!(!registry.get("a").unwrap().track);
    }

    #[test]
    fn test_mutations_reach_the_store() {
        let registry = Registry::open(Library::open_in_memory().unwrap()).unwrap();
        registry.insert(project("a", true)).unwrap();
        registry.mutate("a", |p| p.griefed = true).unwrap();
        registry.update_settings(|s| s.cooldown_secs = 7).unwrap();

        // Reload from the store and check nothing was lost
        registry.reload().unwrap();
        assert!(registry.get("a").unwrap().griefed);
        assert_eq!(registry.settings().cooldown_secs, 7);

        registry.remove("a").unwrap();
        registry.reload().unwrap();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_fresh_read_sees_other_process_edits() {
        let dir = tempfile::tempdir().unwrap();
        let db = Library::default_path(dir.path());
        let watcher = Registry::open(Library::open(&db).unwrap()).unwrap();
        let cli = Registry::open(Library::open(&db).unwrap()).unwrap();

        watcher.insert(project("a", true)).unwrap();
        let edit = ProjectEdit { end: Some(Position::new(4, 4)), ..Default::default() };
        cli.edit("a", &edit).unwrap();

        // The cached copy is stale until something re-reads the store
        assert_eq!(watcher.get("a").unwrap().end, Position::new(2, 2));
        assert_eq!(watcher.get_fresh("a").unwrap().end, Position::new(4, 4));
        assert_eq!(watcher.get("a").unwrap().end, Position::new(4, 4));
    }

    #[test]
    fn test_persistence_failure_keeps_memory_state() {
        let registry = Registry::open(BrokenStore).unwrap();
        registry.insert(project("a", true)).unwrap();
        assert_eq!(registry.list().len(), 1);

        // The store never received it: reloading reconciles to the empty store
        registry.reload().unwrap();
        assert!(registry.list().is_empty());

        assert!(registry.update_settings(|s| s.cooldown_secs = 1).is_err());
    }
}
