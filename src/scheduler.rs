/// Sweep scheduler
///
/// Drives the per-project check cycle:
///
/// 1. Fetch the tile image and crop the watched region
/// 2. No reference yet: store the crop as the baseline and stop
/// 3. Diff against the reference
/// 4. On changes: synthesize the restore patch, script and change log
/// 5. Apply the clean/griefed transition and persist the record
/// 6. Write artifacts and send the alert the transition asks for
///
/// Projects are checked strictly one at a time, with a fixed delay between
/// them, to stay under the canvas request rate limit. A failure in one cycle
/// is logged and the sweep moves on.

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::color::PaletteIndex;
use crate::error::{CycleError, ValidationError};
use crate::notify::{Notification, Notifier};
use crate::patch::{self, parse_tile_coords, render_change_log, render_script};
use crate::snapshot::diff::{self, DiffOptions};
use crate::snapshot::store::{self, SnapshotStore};
use crate::snapshot::Fetcher;
use crate::state::machine::{self, Alert, Transition};
use crate::state::Registry;

/// Process-wide stop request.
///
/// Checked between projects and used for every scheduler sleep, so a stop
/// never interrupts a cycle but does cut a cooldown short.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (flag, wake) = &*self.inner;
        *flag.lock().unwrap_or_else(|p| p.into_inner()) = true;
        wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleep for `duration` or until stopped. Returns true when stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, wake) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut stopped = flag.lock().unwrap_or_else(|p| p.into_inner());
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            stopped = match wake.wait_timeout(stopped, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *stopped
    }
}

/// What a completed cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No reference existed; the fetched region became the reference
    BaselineCreated,
    /// The region was compared against its reference
    Checked {
        transition: Transition,
        changed: usize,
        restorable: usize,
        skipped: usize,
        script: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub project: String,
    pub outcome: CycleOutcome,
    pub message: String,
}

/// Totals of one sweep or manual "check all"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub failed: usize,
    pub griefed: usize,
    /// The stop signal ended the sweep early
    pub stopped: bool,
}

pub struct Scheduler {
    registry: Arc<Registry>,
    snapshots: SnapshotStore,
    palette: Arc<RwLock<PaletteIndex>>,
    fetcher: Box<dyn Fetcher>,
    notifier: Box<dyn Notifier>,
    /// Held for the duration of one project cycle: one tile request at a time
    cycle_gate: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        snapshots: SnapshotStore,
        palette: Arc<RwLock<PaletteIndex>>,
        fetcher: impl Fetcher + 'static,
        notifier: impl Notifier + 'static,
    ) -> Self {
        Self {
            registry,
            snapshots,
            palette,
            fetcher: Box::new(fetcher),
            notifier: Box::new(notifier),
            cycle_gate: Mutex::new(()),
        }
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.cycle_gate.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run one check cycle for `name`, tracked or not.
    pub fn check_project(&self, name: &str) -> Result<CycleReport, CycleError> {
        let _gate = self.gate();

        // Another process may have edited the record since the last reload
        let project = self
            .registry
            .get_fresh(name)
            .ok_or_else(|| ValidationError::UnknownProject(name.to_string()))?;
        let settings = self.registry.settings();

        info!("🔍 Checking art: {}", name);

        let bytes = self.fetcher.fetch(&project.image_source, settings.fetch_timeout())?;
        let tile = store::decode(&bytes)?;
        let latest = store::crop(&tile, project.start, project.end)?;
        self.snapshots.save_latest(name, &latest)?;

        let Some(reference) = self.snapshots.reference(name)? else {
            self.snapshots.save_reference(name, &latest)?;
            let message = "Original image not found, saved the current one as original.".to_string();
            info!("📸 {}: {}", name, message);
            return Ok(CycleReport {
                project: name.to_string(),
                outcome: CycleOutcome::BaselineCreated,
                message,
            });
        };

        let options = DiffOptions {
            threshold: settings.similarity_threshold,
            check_transparent: project.check_transparent_pixels,
        };
        let changes = diff::diff(&reference, &latest, options)?.changes;

        let mut change_log = String::new();
        let mut script = None;
        let mut restorable = 0;
        let mut skipped = 0;
        if !changes.is_empty() {
            let palette = self.palette.read().unwrap_or_else(|p| p.into_inner());
            let patch = patch::synthesize(&changes, project.start, &palette);
            change_log = render_change_log(&changes, &patch, project.start, &palette);
            restorable = patch.instructions.len();
            skipped = patch.skipped.len();

            match parse_tile_coords(&project.image_source) {
                Some(tile) => script = Some(render_script(&patch, tile)),
                None => change_log.push_str("Restore script withheld: tile coordinates unknown.\n"),
            }
        }

        let (transition, record) = self.registry.mutate(name, |record| {
            let transition = machine::apply_check(record, changes.len());
            (transition, record.clone())
        })?;

        let message = transition.message(changes.len());
        match transition.alert() {
            Alert::Griefed => warn!("🚨 {}: {}", name, message),
            _ => info!("✅ {}: {}", name, message),
        }

        let script_path = self.write_artifacts(name, &record.last_checked, &change_log, script.as_deref());

        if record.track {
            let notification = match transition.alert() {
                Alert::None => None,
                Alert::Griefed => Some(Notification::griefed(
                    name,
                    changes.len(),
                    restorable,
                    script,
                    vec![self.snapshots.reference_path(name), self.snapshots.latest_path(name)],
                )),
                Alert::Restored => Some(Notification::restored(name)),
            };
            if let Some(notification) = notification {
                if let Err(e) = self.notifier.notify(&notification) {
                    warn!("📭 {}", e);
                }
            }
        }

        Ok(CycleReport {
            project: name.to_string(),
            outcome: CycleOutcome::Checked {
                transition,
                changed: changes.len(),
                restorable,
                skipped,
                script: script_path,
            },
            message,
        })
    }

    /// Artifacts are best effort: the record is already persisted, so a
    /// failed write is logged rather than failing the cycle.
    fn write_artifacts(&self, name: &str, checked_at: &str, change_log: &str, script: Option<&str>) -> Option<PathBuf> {
        if let Err(e) = self.snapshots.write_change_log(name, checked_at, change_log) {
            warn!("⚠️  {}: could not write change log: {}", name, e);
        }

        let written = match script {
            Some(script) => self.snapshots.write_script(name, script).map(Some),
            None => self.snapshots.clear_script(name).map(|_| None),
        };
        written.unwrap_or_else(|e| {
            warn!("⚠️  {}: could not update restore script: {}", name, e);
            None
        })
    }

    /// Check every tracked project once, in registry order, pausing between
    /// projects. No cooldown is applied.
    pub fn check_all(&self, stop: &StopSignal) -> SweepSummary {
        let mut summary = SweepSummary::default();

        for (i, name) in self.registry.tracked_names().iter().enumerate() {
            if stop.is_stopped() || (i > 0 && stop.sleep(self.registry.settings().project_delay())) {
                summary.stopped = true;
                break;
            }

            match self.check_project(name) {
                Ok(report) => {
                    summary.checked += 1;
                    if matches!(report.outcome, CycleOutcome::Checked { transition, .. } if transition.alert() == Alert::Griefed) {
                        summary.griefed += 1;
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("❌ {}: check failed: {}", name, e);
                }
            }
        }

        summary
    }

    /// Pick up palette overrides saved by other processes. The current
    /// overlay stays in place when the file cannot be read.
    fn reload_palette(&self) {
        let path = self
            .palette
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .config_path()
            .map(Path::to_path_buf);
        let Some(path) = path else {
            return;
        };

        match PaletteIndex::load(path) {
            Ok(fresh) => *self.palette.write().unwrap_or_else(|p| p.into_inner()) = fresh,
            Err(e) => warn!("⚠️  Could not reload palette overrides, keeping the current ones: {}", e),
        }
    }

    /// Automatic sweep loop; returns once `stop` is signalled.
    pub fn run(&self, stop: &StopSignal) {
        info!("🛰️  Sweep worker started");

        while !stop.is_stopped() {
            if let Err(e) = self.registry.reload() {
                warn!("⚠️  Could not reload the catalog, using in-memory state: {}", e);
            }
            self.reload_palette();
            let settings = self.registry.settings();

            if !settings.automated_checks {
                stop.sleep(settings.poll_interval());
                continue;
            }

            info!("▬▬▬▬▬▬▬▬▬▬ Sweep at {} ▬▬▬▬▬▬▬▬▬▬", Local::now().format("%Y-%m-%d %H:%M:%S"));
            let summary = self.check_all(stop);
            info!(
                "📊 Sweep done: {} checked, {} griefed, {} failed",
                summary.checked, summary.griefed, summary.failed
            );

            // Settings may have changed during the sweep
            stop.sleep(self.registry.settings().cooldown());
        }

        info!("🛑 Sweep worker stopped");
    }

    /// Run the sweep loop on a dedicated thread
    pub fn spawn(self: Arc<Self>, stop: StopSignal) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("sweep".to_string())
            .spawn(move || self.run(&stop))
    }
}
