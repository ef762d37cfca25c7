//! One-time move from the single `chapters.json` store to per-project files.
//!
//! Layout after a successful run:
//!
//! ```text
//! <data>/chapters.json.backup
//! <data>/chapters/<projectId>.json
//! ```
//!
//! The run is not resumable: if it stops between writing project files and
//! renaming the legacy file, the next run rewrites the project files.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

pub const LEGACY_FILE: &str = "chapters.json";
pub const BACKUP_FILE: &str = "chapters.json.backup";
pub const CHAPTERS_DIR: &str = "chapters";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    NoLegacyFile,
    AlreadyMigrated,
    Migrated {
        projects: usize,
        chapters: usize,
        skipped: usize,
    },
}

pub fn migrate_legacy_store(data_dir: &Path) -> Result<MigrationOutcome> {
    let legacy_path = data_dir.join(LEGACY_FILE);
    let backup_path = data_dir.join(BACKUP_FILE);

    if !legacy_path.exists() {
        info!(path = %legacy_path.display(), "No legacy chapter store, nothing to migrate");
        return Ok(MigrationOutcome::NoLegacyFile);
    }
    if backup_path.exists() {
        info!(path = %backup_path.display(), "Backup already present, migration already ran");
        return Ok(MigrationOutcome::AlreadyMigrated);
    }

    let raw = fs::read_to_string(&legacy_path)
        .with_context(|| format!("Failed to read {}", legacy_path.display()))?;
    let records: Vec<Value> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array", legacy_path.display()))?;

    let (groups, skipped) = group_by_project(records);

    let chapters_dir = data_dir.join(CHAPTERS_DIR);
    fs::create_dir_all(&chapters_dir)
        .with_context(|| format!("Failed to create {}", chapters_dir.display()))?;

    let mut chapters = 0;
    for (project_id, records) in &groups {
        let path = project_file(&chapters_dir, project_id);
        let body = serde_json::to_string_pretty(records)?;
        fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
        chapters += records.len();
        info!(project = %project_id, chapters = records.len(), path = %path.display(), "Wrote project chapters");
    }

    fs::rename(&legacy_path, &backup_path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            legacy_path.display(),
            backup_path.display()
        )
    })?;

    info!(projects = groups.len(), chapters, skipped, "Migration complete");
    Ok(MigrationOutcome::Migrated {
        projects: groups.len(),
        chapters,
        skipped,
    })
}

/// Group records by `projectId`, keeping their original order within a group.
fn group_by_project(records: Vec<Value>) -> (BTreeMap<String, Vec<Value>>, usize) {
    let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    let mut skipped = 0;
    for record in records {
        let project_id = record
            .get("projectId")
            .and_then(Value::as_str)
            .map(str::to_string);
        match project_id {
            Some(project_id) if is_plain_file_stem(&project_id) => {
                groups.entry(project_id).or_default().push(record)
            }
            Some(project_id) => {
                warn!(project = %project_id, "Skipping chapter whose projectId is not a plain file name");
                skipped += 1;
            }
            None => {
                warn!(record = %record, "Skipping chapter without a projectId");
                skipped += 1;
            }
        }
    }
    (groups, skipped)
}

/// True when `id` names a file directly inside the chapters directory.
fn is_plain_file_stem(id: &str) -> bool {
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !id.contains(['/', '\\', '\0'])
}

fn project_file(dir: &Path, project_id: &str) -> PathBuf {
    dir.join(format!("{project_id}.json"))
}
