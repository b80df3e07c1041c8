use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod color;
mod error;
mod notify;
mod patch;
mod scheduler;
mod snapshot;
mod state;

use color::PaletteIndex;
use notify::LogNotifier;
use scheduler::{CycleOutcome, Scheduler, StopSignal};
use snapshot::{HttpFetcher, SnapshotStore};
use state::{Library, Position, Project, ProjectEdit, Registry};

/// Watches pixel-art projects on a shared canvas and prepares restore scripts
/// when someone paints over them
#[derive(Parser, Debug)]
#[command(name = "canvas-warden", version)]
struct Cli {
    /// Directory holding the catalog, palette file and project snapshots
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the automatic sweep until Ctrl-C (default)
    Watch,
    /// Check one project, or every tracked project with --all
    Check {
        name: Option<String>,
        #[arg(long, conflicts_with = "name")]
        all: bool,
    },
    /// Manage watched projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Inspect or change which palette colors may be used for restores
    #[command(subcommand)]
    Palette(PaletteCommand),
    /// Inspect or change watcher settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// Register a new project
    Add {
        name: String,
        /// Tile image URL, e.g. https://host/files/s0/tiles/1611/875.png
        url: String,
        /// Top-left corner inside the tile, as X,Y
        #[arg(long, value_parser = parse_position)]
        start: Position,
        /// Bottom-right corner inside the tile (exclusive), as X,Y
        #[arg(long, value_parser = parse_position)]
        end: Position,
        /// Register without including it in sweeps
        #[arg(long)]
        untracked: bool,
        /// Also report changes on transparent reference pixels
        #[arg(long)]
        check_transparent: bool,
    },
    /// List projects
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove a project and its snapshots
    Remove { name: String },
    /// Change fields of a project
    Edit(EditArgs),
}

#[derive(Args, Debug)]
struct EditArgs {
    name: String,
    #[arg(long)]
    track: Option<bool>,
    #[arg(long)]
    check_transparent: Option<bool>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long, value_parser = parse_position)]
    start: Option<Position>,
    #[arg(long, value_parser = parse_position)]
    end: Option<Position>,
}

#[derive(Subcommand, Debug)]
enum PaletteCommand {
    /// Show every color with its ordinal and ownership
    List {
        #[arg(long)]
        json: bool,
    },
    /// Allow or forbid a color in restore scripts, e.g. `palette set STONE true`
    Set {
        name: String,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Drop the override of one color, or of all colors
    Reset { name: Option<String> },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print the current settings as JSON
    Show,
    /// Set one field, e.g. `settings set cooldown_secs 600`
    Set { key: String, value: String },
}

fn parse_position(s: &str) -> Result<Position, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{s}'"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x '{x}': {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y '{y}': {e}"))?;
    Ok(Position::new(x, y))
}

/// Everything a command needs, opened from the data directory
struct App {
    registry: Arc<Registry>,
    snapshots: SnapshotStore,
    palette: Arc<RwLock<PaletteIndex>>,
}

impl App {
    fn open(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("cannot create data directory {}", data_dir.display()))?;

        let library = Library::open(Library::default_path(&data_dir)).context("cannot open catalog")?;
        info!("📂 Catalog at {}", library.path().display());

        let registry = Registry::open(library).context("cannot load catalog")?;
        let palette = PaletteIndex::load(data_dir.join("color_config.json")).context("cannot load palette file")?;

        Ok(Self {
            registry: Arc::new(registry),
            snapshots: SnapshotStore::new(data_dir.join("projects")),
            palette: Arc::new(RwLock::new(palette)),
        })
    }

    fn scheduler(&self) -> Result<Scheduler> {
        Ok(Scheduler::new(
            self.registry.clone(),
            self.snapshots.clone(),
            self.palette.clone(),
            HttpFetcher::new()?,
            LogNotifier,
        ))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("canvas_warden=info")),
        )
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .ok_or_else(|| anyhow!("no data directory on this platform, pass --data-dir"))?
            .join("canvas-warden"),
    };
    let app = App::open(data_dir)?;

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(&app),
        Command::Check { name, all } => check(&app, name, all),
        Command::Project(command) => project(&app, command),
        Command::Palette(command) => palette(&app, command),
        Command::Settings(command) => settings(&app, command),
    }
}

/// Run the sweep on its own thread; the async runtime only waits for Ctrl-C
fn watch(app: &App) -> Result<()> {
    let scheduler = Arc::new(app.scheduler()?);
    let stop = StopSignal::new();
    let worker = scheduler.spawn(stop.clone()).context("cannot start sweep worker")?;

    if !app.registry.settings().automated_checks {
        info!("⏸️  Automated checks are off; enable with `settings set automated_checks true`");
    }

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(tokio::signal::ctrl_c())
        .context("cannot listen for Ctrl-C")?;

    info!("👋 Shutting down after the current project");
    stop.stop();
    worker.join().map_err(|_| anyhow!("sweep worker panicked"))?;
    Ok(())
}

fn check(app: &App, name: Option<String>, all: bool) -> Result<()> {
    let scheduler = app.scheduler()?;

    if all {
        let summary = scheduler.check_all(&StopSignal::new());
        println!(
            "📊 {} checked, {} griefed, {} failed",
            summary.checked, summary.griefed, summary.failed
        );
        return Ok(());
    }

    let Some(name) = name else {
        bail!("name a project or pass --all");
    };
    let report = scheduler.check_project(&name)?;
    println!("{}: {}", report.project, report.message);
    if let CycleOutcome::Checked { restorable, skipped, script: Some(script), .. } = report.outcome {
        println!("🩹 {} restorable, {} skipped, script at {}", restorable, skipped, script.display());
    }
    Ok(())
}

fn project(app: &App, command: ProjectCommand) -> Result<()> {
    match command {
        ProjectCommand::Add { name, url, start, end, untracked, check_transparent } => {
            let mut project = Project::new(name, url, start, end);
            project.track = !untracked;
            project.check_transparent_pixels = check_transparent;
            app.registry.insert(project)?;
        }
        ProjectCommand::List { json } => {
            let projects = app.registry.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
                return Ok(());
            }
            for p in projects {
                let state = if p.griefed { "🚨 griefed" } else { "✅ clean" };
                let checked = if p.last_checked.is_empty() { "never" } else { p.last_checked.as_str() };
                let (width, height) = p.region_size();
                println!(
                    "{} [{}] {} ({},{}) {}x{} last checked {}{}",
                    p.name,
                    if p.track { "tracked" } else { "untracked" },
                    state,
                    p.start.x,
                    p.start.y,
                    width,
                    height,
                    checked,
                    if p.check_transparent_pixels { ", transparent pixels checked" } else { "" },
                );
            }
        }
        ProjectCommand::Remove { name } => {
            app.registry.remove(&name)?;
            if let Err(e) = app.snapshots.remove_project(&name) {
                warn!("⚠️  Could not delete snapshots of {}: {}", name, e);
            }
        }
        ProjectCommand::Edit(args) => {
            let current = app
                .registry
                .get(&args.name)
                .ok_or_else(|| error::ValidationError::UnknownProject(args.name.clone()))?;
            let edit = ProjectEdit {
                track: args.track,
                check_transparent_pixels: args.check_transparent,
                image_source: args.url,
                start: args.start,
                end: args.end,
            };
            app.registry.edit(&args.name, &edit)?;

            // The old reference no longer describes the watched pixels
            if edit.changes_region(&current) {
                app.snapshots.discard_reference(&args.name)?;
                info!("🔁 Region of {} changed; the next check takes a new reference", args.name);
            }
        }
    }
    Ok(())
}

fn palette(app: &App, command: PaletteCommand) -> Result<()> {
    let mut palette = app.palette.write().map_err(|_| anyhow!("palette lock poisoned"))?;
    match command {
        PaletteCommand::List { json } => {
            let entries = palette.entries();
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            for c in entries {
                let [r, g, b, a] = c.rgba;
                println!(
                    "{:>2} {:<18} rgba({r},{g},{b},{a}) {}{}",
                    c.ordinal,
                    c.name,
                    if c.enabled { "enabled" } else { "disabled" },
                    if c.overridden { " (override)" } else { "" },
                );
            }
            return Ok(());
        }
        PaletteCommand::Set { name, enabled } => palette.set_override(&name, enabled)?,
        PaletteCommand::Reset { name } => palette.reset(name.as_deref()),
    }
    palette.save()?;
    Ok(())
}

fn settings(app: &App, command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&app.registry.settings())?);
        }
        SettingsCommand::Set { key, value } => {
            let mut fields = serde_json::to_value(app.registry.settings())?;
            let slot = fields
                .get_mut(&key)
                .ok_or_else(|| anyhow!("unknown setting '{key}'"))?;
            *slot = serde_json::from_str(&value).with_context(|| format!("'{value}' is not a valid value"))?;
            let parsed: state::Settings =
                serde_json::from_value(fields).with_context(|| format!("invalid value for {key}"))?;

            let saved = app.registry.update_settings(|s| *s = parsed)?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position("343,878"), Ok(Position::new(343, 878)));
        assert_eq!(parse_position(" 1, 2"), Ok(Position::new(1, 2)));
        assert!(parse_position("343").is_err());
        assert!(parse_position("-1,2").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "canvas-warden", "project", "add", "Cat", "https://h/tiles/1/2.png", "--start", "0,0", "--end", "4,4",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Project(ProjectCommand::Add { untracked: false, .. }))));

        assert!(Cli::try_parse_from(["canvas-warden", "check", "Cat", "--all"]).is_err());

        for (value, expected) in [("true", true), ("false", false)] {
            let cli = Cli::try_parse_from(["canvas-warden", "palette", "set", "STONE", value]).unwrap();
            let Some(Command::Palette(PaletteCommand::Set { name, enabled })) = cli.command else {
                panic!("expected palette set");
            };
            assert_eq!((name.as_str(), enabled), ("STONE", expected));
        }
        assert!(Cli::try_parse_from(["canvas-warden", "palette", "set", "STONE", "maybe"]).is_err());
        assert!(Cli::try_parse_from(["canvas-warden"]).unwrap().command.is_none());
    }
}
