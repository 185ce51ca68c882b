//! The `plan` command

use transit_ridership_core::periods::plan_units;

use super::PlanArgs;
use crate::error::CliError;

/// Handle the `plan` command
pub fn handle_plan(args: &PlanArgs) -> Result<(), CliError> {
    if let Some(year) = args.years.iter().find(|y| !(1900..=2200).contains(*y)) {
        return Err(CliError::InvalidArgument(format!(
            "year {year} is out of range (1900-2200)"
        )));
    }

    let units = plan_units(&args.years);

    if args.json {
        let json =
            serde_json::to_string_pretty(&units).map_err(|e| CliError::Output(e.to_string()))?;
        println!("{json}");
        return Ok(());
    }

    println!(
        "{:>6}  {:>4}  {:>5}  {:<10}  {:<10}  days",
        "global", "year", "index", "start", "end"
    );
    for unit in &units {
        println!(
            "{:>6}  {:>4}  {:>5}  {:<10}  {:<10}  {}",
            unit.global_index,
            unit.year,
            unit.index,
            unit.start,
            unit.end,
            unit.len_days()
        );
    }
    eprintln!();
    eprintln!("{} units", units.len());
    Ok(())
}
