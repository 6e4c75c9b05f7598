use std::path::Path;

use crate::scenario::Scenario;

pub fn check(path: &str) -> anyhow::Result<()> {
    let scenario = Scenario::from_file(Path::new(path))?;
    let sorter = scenario.load()?;
    sorter.verify()?;

    let active = sorter
        .clients()
        .filter(|client| sorter.is_active(client).unwrap_or(false))
        .count();
    println!(
        "✓ {} clients ({} active), {} tree nodes, invariants hold",
        sorter.count(),
        active,
        sorter.tree().len()
    );
    Ok(())
}
