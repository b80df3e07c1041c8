/// Clean / griefed state machine of a watched project
///
/// | From    | Event        | To      | Side effect                      |
/// |---------|--------------|---------|----------------------------------|
/// | CLEAN   | ≥1 change    | GRIEFED | alert with patch script          |
/// | GRIEFED | 0 changes    | CLEAN   | "restored" message, no script    |
/// | CLEAN   | 0 changes    | CLEAN   | nothing                          |
/// | GRIEFED | ≥1 change    | GRIEFED | alert again with the new patch   |
///
/// A griefed project alerts on every check: the canvas may have drifted
/// further, and each alert carries the script for the current drift.

use chrono::Local;

use super::data::Project;

/// Format of `Project::last_checked`
pub const CHECKED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtState {
    Clean,
    Griefed,
}

impl ArtState {
    pub fn of(project: &Project) -> Self {
        if project.griefed {
            ArtState::Griefed
        } else {
            ArtState::Clean
        }
    }
}

/// Which row of the transition table a check landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    StayedClean,
    BecameGriefed,
    StillGriefed,
    Restored,
}

/// What the caller must send out after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    None,
    /// Changes found; the alert carries the patch script
    Griefed,
    /// Back to the reference; no script
    Restored,
}

impl Transition {
    /// Decide the transition from the current state and the diff size
    pub fn decide(from: ArtState, change_count: usize) -> Self {
        match (from, change_count) {
            (ArtState::Clean, 0) => Transition::StayedClean,
            (ArtState::Clean, _) => Transition::BecameGriefed,
            (ArtState::Griefed, 0) => Transition::Restored,
            (ArtState::Griefed, _) => Transition::StillGriefed,
        }
    }

    pub fn target(self) -> ArtState {
        match self {
            Transition::StayedClean | Transition::Restored => ArtState::Clean,
            Transition::BecameGriefed | Transition::StillGriefed => ArtState::Griefed,
        }
    }

    pub fn alert(self) -> Alert {
        match self {
            Transition::StayedClean => Alert::None,
            Transition::BecameGriefed | Transition::StillGriefed => Alert::Griefed,
            Transition::Restored => Alert::Restored,
        }
    }

    /// Short status line, used for logs and command output
    pub fn message(self, change_count: usize) -> String {
        match self {
            Transition::StayedClean => "No changes detected in pixels.".to_string(),
            Transition::Restored => "Pixels restored to original state.".to_string(),
            Transition::BecameGriefed | Transition::StillGriefed => {
                format!("Detected {change_count} changed pixels!")
            }
        }
    }
}

/// Apply a check result to a project record.
///
/// Every branch stamps `last_checked`; the griefed flag follows the table.
pub fn apply_check(project: &mut Project, change_count: usize) -> Transition {
    let transition = Transition::decide(ArtState::of(project), change_count);
    project.griefed = transition.target() == ArtState::Griefed;
    project.last_checked = Local::now().format(CHECKED_AT_FORMAT).to_string();
    transition
}
