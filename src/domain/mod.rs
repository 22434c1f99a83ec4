pub mod album;
pub mod track;
pub mod match_candidate;
pub mod setting;
pub mod activity_log;
pub mod tag_backup;

pub use album::{Album, AlbumStatus};
pub use track::{Track, TrackStatus};
pub use match_candidate::MatchCandidate;
pub use setting::{Setting, SettingValue};
pub use activity_log::ActivityLogEntry;
pub use tag_backup::{BackupAction, TagBackup, TrackTagSnapshot};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Name field cannot be an empty string.")]
    NameIsEmptyString,

    #[error("Path cannot be an empty string.")]
    PathIsEmptyString,

    #[error("Confidence must be in the range [0, 100], got {0}.")]
    ConfidenceOutOfRange(f64),

    #[error("Disc number must be >= 1, got {0}.")]
    DiscNumberIsZero,
}

/// Outcome of a batch reconciliation (scanner add/update/delete pass).
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub added: Vec<Uuid>,
    pub updated: Vec<Uuid>,
    pub removed: Vec<Uuid>,
}

impl ReconcileReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}
