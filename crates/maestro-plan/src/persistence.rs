//! Crash-resilient plan snapshots.
//!
//! The orchestrator persists a snapshot after every todo state change so a
//! crashed session can be inspected or resumed. Writes go through a
//! temp-file-then-rename so a crash mid-write never leaves a truncated
//! snapshot behind.
//!
//! Persistence is best-effort during execution: the orchestrator logs
//! failures and keeps running. Cleanup is likewise best-effort.

use std::fs;
use std::path::{Path, PathBuf};

use maestro_core::ids::PlanId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::PlanError;
use crate::types::Plan;

/// Snapshot file format version.
const SNAPSHOT_VERSION: u32 = 1;

/// On-disk snapshot of a plan mid-execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSnapshot {
    /// Format version, for forward compatibility.
    pub version: u32,
    /// When the snapshot was written (ISO 8601).
    pub saved_at: String,
    /// The full plan, including per-todo status and progress.
    pub plan: Plan,
}

/// Writes and reads plan snapshots under a base directory.
#[derive(Debug, Clone)]
pub struct PlanPersistence {
    base_dir: PathBuf,
}

impl PlanPersistence {
    /// Create a persistence layer rooted at `base_dir`. The directory is
    /// created on first save, not here.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Path of the snapshot file for a plan.
    #[must_use]
    pub fn snapshot_path(&self, id: &PlanId) -> PathBuf {
        self.base_dir.join(format!("{id}.json"))
    }

    /// Persist the current state of a plan.
    pub fn save(&self, plan: &Plan) -> Result<(), PlanError> {
        fs::create_dir_all(&self.base_dir)?;
        let snapshot = PlanSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: crate::types::now_rfc3339(),
            plan: plan.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        let path = self.snapshot_path(&plan.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!(plan_id = %plan.id, path = %path.display(), "snapshot saved");
        Ok(())
    }

    /// Persist without failing the caller. Execution continues even when
    /// the disk does not cooperate.
    pub fn save_best_effort(&self, plan: &Plan) {
        if let Err(e) = self.save(plan) {
            warn!(plan_id = %plan.id, error = %e, "snapshot save failed, continuing");
        }
    }

    /// Load a snapshot by plan id.
    pub fn load(&self, id: &PlanId) -> Result<PlanSnapshot, PlanError> {
        let json = fs::read_to_string(self.snapshot_path(id))?;
        let snapshot: PlanSnapshot = serde_json::from_str(&json)?;
        Ok(snapshot)
    }

    /// Remove a plan's snapshot. Best-effort: a missing file or a
    /// filesystem error is logged and swallowed.
    pub fn delete_artifacts(&self, id: &PlanId) {
        let path = self.snapshot_path(id);
        match fs::remove_file(&path) {
            Ok(()) => debug!(plan_id = %id, "snapshot removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(plan_id = %id, path = %path.display(), error = %e, "snapshot removal failed");
            }
        }
    }

    /// List ids of all persisted snapshots (for crash recovery at startup).
    pub fn list(&self) -> Result<Vec<PlanId>, PlanError> {
        let mut ids = Vec::new();
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = Path::new(&name).file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(id) = PlanId::parse(stem) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{PlanDraft, PlanStore};
    use crate::types::{Todo, TodoStatus};

    fn sample_plan() -> Plan {
        let mut store = PlanStore::new();
        let a = Todo::new("first");
        let b = Todo::new("second").depends_on(a.id.clone());
        let id = store
            .create_plan("snapshot me", vec![a, b], PlanDraft::default())
            .unwrap();
        store.remove(&id).unwrap()
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = PlanPersistence::new(dir.path());
        let mut plan = sample_plan();
        let first = plan.todos[0].id.clone();
        plan.todo_mut(&first)
            .unwrap()
            .set_status(TodoStatus::InProgress)
            .unwrap();
        plan.todo_mut(&first).unwrap().set_progress(40);

        persistence.save(&plan).unwrap();
        let snapshot = persistence.load(&plan.id).unwrap();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.plan, plan);
        assert_eq!(snapshot.plan.todo(&first).unwrap().progress, 40);
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = PlanPersistence::new(dir.path());
        let mut plan = sample_plan();
        persistence.save(&plan).unwrap();

        let first = plan.todos[0].id.clone();
        plan.todo_mut(&first)
            .unwrap()
            .set_status(TodoStatus::InProgress)
            .unwrap();
        persistence.save(&plan).unwrap();

        let snapshot = persistence.load(&plan.id).unwrap();
        assert_eq!(
            snapshot.plan.todo(&first).unwrap().status,
            TodoStatus::InProgress
        );
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = PlanPersistence::new(dir.path());
        let plan = sample_plan();
        persistence.save(&plan).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn load_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = PlanPersistence::new(dir.path());
        let err = persistence.load(&PlanId::generate()).unwrap_err();
        assert!(matches!(err, PlanError::Io(_)));
    }

    #[test]
    fn delete_artifacts_removes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = PlanPersistence::new(dir.path());
        let plan = sample_plan();
        persistence.save(&plan).unwrap();
        persistence.delete_artifacts(&plan.id);
        assert!(!persistence.snapshot_path(&plan.id).exists());
    }

    #[test]
    fn delete_artifacts_missing_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = PlanPersistence::new(dir.path());
        // No snapshot was ever saved; must not panic or error.
        persistence.delete_artifacts(&PlanId::generate());
    }

    #[test]
    fn list_finds_saved_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = PlanPersistence::new(dir.path());
        let plan_a = sample_plan();
        let plan_b = sample_plan();
        persistence.save(&plan_a).unwrap();
        persistence.save(&plan_b).unwrap();
        let ids = persistence.list().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&plan_a.id));
        assert!(ids.contains(&plan_b.id));
    }

    #[test]
    fn list_on_missing_dir_is_empty() {
        let persistence = PlanPersistence::new("/nonexistent/maestro-test-dir");
        assert!(persistence.list().unwrap().is_empty());
    }
}
