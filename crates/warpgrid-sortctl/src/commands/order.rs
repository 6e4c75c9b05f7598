use std::path::Path;

use serde::Serialize;
use tracing::info;
use warpgrid_resources::ResourceQuantities;

use crate::scenario::Scenario;

#[derive(Debug, Serialize)]
struct OrderReport {
    rounds: Vec<Vec<String>>,
    allocated: ResourceQuantities,
    total: ResourceQuantities,
}

pub fn order(path: &str, rounds: usize, format: &str) -> anyhow::Result<()> {
    let scenario = Scenario::from_file(Path::new(path))?;
    let mut sorter = scenario.load()?;
    info!(clients = sorter.count(), rounds, "sorting scenario");

    let report = OrderReport {
        rounds: (0..rounds).map(|_| sorter.sort()).collect(),
        allocated: sorter.cluster_allocation_scalar_quantities().clone(),
        total: sorter.total_scalar_quantities().clone(),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            for (i, round) in report.rounds.iter().enumerate() {
                println!("round {}: {}", i + 1, round.join(", "));
            }
            println!("allocated: {}", report.allocated);
            println!("total:     {}", report.total);
        }
    }

    Ok(())
}
