//! Snapshot persistence for engine state.
//!
//! Hosts that keep their own database can serialize the engine types
//! directly. This module offers a simple versioned JSON snapshot of an
//! encounter store and a character roster for hosts that do not.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::character::Character;
use crate::encounter::EncounterStore;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current snapshot format version.
pub const SAVE_VERSION: u32 = 1;

/// Summary stored alongside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub campaign_name: String,
    pub saved_at: DateTime<Utc>,
    pub characters: usize,
    pub encounters: usize,
    pub active_encounters: usize,
}

/// Everything needed to resume a campaign's rules state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version for compatibility checking.
    pub version: u32,
    pub metadata: SnapshotMetadata,
    pub encounters: EncounterStore,
    pub characters: Vec<Character>,
}

impl Snapshot {
    pub fn new(
        campaign_name: impl Into<String>,
        encounters: EncounterStore,
        characters: Vec<Character>,
    ) -> Self {
        let metadata = SnapshotMetadata {
            campaign_name: campaign_name.into(),
            saved_at: Utc::now(),
            characters: characters.len(),
            encounters: encounters.len(),
            active_encounters: encounters.active().count(),
        };
        Self {
            version: SAVE_VERSION,
            metadata,
            encounters,
            characters,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        info!(path = %path.display(), campaign = %self.metadata.campaign_name, "Snapshot saved");
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let snapshot: Self = serde_json::from_str(&content)?;
        check_version(snapshot.version)?;
        Ok(snapshot)
    }

    /// Read only the metadata of a snapshot file.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SnapshotMetadata, PersistError> {
        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: SnapshotMetadata,
        }

        let content = fs::read_to_string(path).await?;
        let partial: Partial = serde_json::from_str(&content)?;
        check_version(partial.version)?;
        Ok(partial.metadata)
    }
}

fn check_version(found: u32) -> Result<(), PersistError> {
    if found != SAVE_VERSION {
        return Err(PersistError::VersionMismatch {
            expected: SAVE_VERSION,
            found,
        });
    }
    Ok(())
}

/// Snapshot file name for a campaign inside `base_dir`.
pub fn snapshot_path(base_dir: impl AsRef<Path>, campaign_name: &str) -> PathBuf {
    let sanitized: String = campaign_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    base_dir.as_ref().join(format!("{sanitized}_rules.json"))
}
