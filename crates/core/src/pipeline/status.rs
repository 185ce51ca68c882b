//! Read-only view of a pipeline's on-disk state

use std::path::PathBuf;

use serde::Serialize;

use super::config::PipelineConfig;
use super::error::PipelineResult;
use crate::consolidate::list_partitions;
use crate::periods::{WeeklyUnit, plan_units};
use crate::store::{ProgressState, ProgressStore, WeeklyUnitStore};

/// Progress of a configured plan, as recorded in the staging directory
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub staging_path: PathBuf,
    pub final_dataset_path: PathBuf,
    /// Checkpoint contents, if any unit has completed
    pub checkpoint: Option<ProgressState>,
    /// Whether the checkpoint belongs to the configured years and routes
    pub checkpoint_matches_plan: bool,
    pub planned_units: usize,
    pub completed_units: usize,
    pub staged_artifacts: usize,
    /// First unit a resumed run would process
    pub next_unit: Option<WeeklyUnit>,
    pub final_partitions: usize,
}

impl StatusSnapshot {
    /// Inspect the staging directory and final dataset for a configuration
    pub fn collect(config: &PipelineConfig) -> PipelineResult<Self> {
        let staging_path = config.staging_path();
        let final_dataset_path = config.final_dataset_path();

        let checkpoint = ProgressStore::in_dir(&staging_path).load()?;
        let checkpoint_matches_plan = checkpoint
            .as_ref()
            .and_then(|c| c.plan_fingerprint.as_deref())
            .is_none_or(|fp| fp == config.plan_fingerprint());

        let units = plan_units(&config.years);
        let completed_units = match &checkpoint {
            Some(state) if checkpoint_matches_plan => units
                .iter()
                .filter(|u| state.covers(u.global_index))
                .count(),
            _ => 0,
        };
        let next_unit = units.get(completed_units).copied();

        let staged_artifacts = WeeklyUnitStore::new(&staging_path).list_all()?.len();
        let final_partitions = list_partitions(&final_dataset_path)?.len();

        Ok(Self {
            staging_path,
            final_dataset_path,
            checkpoint,
            checkpoint_matches_plan,
            planned_units: units.len(),
            completed_units,
            staged_artifacts,
            next_unit,
            final_partitions,
        })
    }

    /// Whether every planned unit is covered by the checkpoint
    pub fn is_complete(&self) -> bool {
        self.planned_units > 0 && self.completed_units == self.planned_units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> PipelineConfig {
        PipelineConfig::new()
            .with_years(vec![2023])
            .with_routes(["B46"])
            .with_base_path(temp.path())
    }

    #[test]
    fn test_status_without_any_run() {
        let temp = TempDir::new().unwrap();
        let status = StatusSnapshot::collect(&config(&temp)).unwrap();

        assert!(status.checkpoint.is_none());
        assert!(status.checkpoint_matches_plan);
        assert_eq!(status.completed_units, 0);
        assert_eq!(status.planned_units, plan_units(&[2023]).len());
        assert_eq!(status.next_unit.map(|u| u.global_index), Some(0));
        assert_eq!(status.staged_artifacts, 0);
        assert_eq!(status.final_partitions, 0);
        assert!(!status.is_complete());
    }

    #[test]
    fn test_status_after_partial_progress() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        ProgressStore::in_dir(&config.staging_path())
            .save(&ProgressState::new(4).with_fingerprint(config.plan_fingerprint()))
            .unwrap();

        let status = StatusSnapshot::collect(&config).unwrap();
        assert_eq!(status.completed_units, 5);
        assert_eq!(status.next_unit.map(|u| u.global_index), Some(5));
    }

    #[test]
    fn test_status_flags_foreign_checkpoint() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        ProgressStore::in_dir(&config.staging_path())
            .save(&ProgressState::new(4).with_fingerprint("other"))
            .unwrap();

        let status = StatusSnapshot::collect(&config).unwrap();
        assert!(!status.checkpoint_matches_plan);
        assert_eq!(status.completed_units, 0);
    }
}
