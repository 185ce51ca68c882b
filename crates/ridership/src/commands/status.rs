//! The `status` command

use transit_ridership_core::pipeline::StatusSnapshot;

use super::ConfigArgs;
use crate::error::CliError;

/// Handle the `status` command
pub fn handle_status(args: &ConfigArgs) -> Result<(), CliError> {
    let config = args.load()?;
    let status = StatusSnapshot::collect(&config)?;

    eprintln!("Pipeline Status");
    eprintln!("===============");
    eprintln!();
    eprintln!("Staging:  {}", status.staging_path.display());
    eprintln!("Dataset:  {}", status.final_dataset_path.display());
    eprintln!();

    match status.checkpoint {
        Some(ref checkpoint) => {
            eprintln!(
                "Checkpoint: last completed unit {}",
                checkpoint.last_completed_index
            );
            if let Some(updated_at) = checkpoint.updated_at {
                eprintln!(
                    "Updated:    {}",
                    updated_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            if !status.checkpoint_matches_plan {
                eprintln!("Warning:    checkpoint was written for different years or routes");
            }
        }
        None => {
            eprintln!("No checkpoint found.");
            eprintln!("Run 'ridership run' to start a new pipeline.");
        }
    }

    if status.planned_units > 0 {
        eprintln!();
        eprintln!(
            "Units:      {}/{} completed",
            status.completed_units, status.planned_units
        );
        match status.next_unit {
            Some(unit) => eprintln!("Next unit:  {} (global {})", unit, unit.global_index),
            None => eprintln!("Next unit:  none, all units completed"),
        }
    }

    eprintln!();
    eprintln!("Staged artifacts: {}", status.staged_artifacts);
    eprintln!("Final partitions: {}", status.final_partitions);

    Ok(())
}
