//! Weighted ordering produced by `sort`.

use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use warpgrid_sorter::{RandomSorter, SorterConfig};

const TRIALS: usize = 10_000;

fn first_share(sorter: &mut RandomSorter, client: &str) -> f64 {
    let mut first = 0;
    for _ in 0..TRIALS {
        if sorter.sort().first().map(String::as_str) == Some(client) {
            first += 1;
        }
    }
    first as f64 / TRIALS as f64
}

fn active_sorter(paths: &[&str]) -> RandomSorter {
    let mut sorter = RandomSorter::seeded(2024);
    for path in paths {
        sorter.add(path).unwrap();
        sorter.activate(path).unwrap();
    }
    sorter
}

#[test]
fn sort_lists_exactly_the_active_clients() {
    let mut sorter = active_sorter(&["a", "a/b", "c/d", "c/e", "f"]);
    sorter.add("c/g").unwrap();
    sorter.deactivate("a/b").unwrap();

    for _ in 0..50 {
        let order = sorter.sort();
        let set: HashSet<&str> = order.iter().map(String::as_str).collect();
        assert_eq!(order.len(), 4);
        assert_eq!(set, HashSet::from(["a", "c/d", "c/e", "f"]));
    }
}

#[test]
fn sort_on_empty_or_inactive_tree_is_empty() {
    let mut sorter = RandomSorter::seeded(1);
    assert!(sorter.sort().is_empty());

    sorter.add("a/b").unwrap();
    sorter.add("c").unwrap();
    assert!(sorter.sort().is_empty());
    assert!(sorter.active_internal_nodes().is_empty());
}

#[test]
fn activation_is_idempotent() {
    let mut sorter = active_sorter(&["a", "b"]);
    sorter.activate("a").unwrap();
    assert_eq!(sorter.sort().len(), 2);

    sorter.deactivate("a").unwrap();
    sorter.deactivate("a").unwrap();
    assert_eq!(sorter.sort(), vec!["b".to_string()]);
    sorter.verify().unwrap();
}

#[test]
fn subtrees_stay_contiguous() {
    let mut sorter = active_sorter(&["x/1", "x/2", "x/3", "y/1", "y/2", "z"]);

    for _ in 0..200 {
        let order = sorter.sort();
        let groups: Vec<&str> = order
            .iter()
            .map(|p| p.split('/').next().unwrap_or(""))
            .collect();
        let mut runs = groups.clone();
        runs.dedup();
        assert_eq!(runs.len(), 3, "interleaved order {order:?}");
    }
}

#[test]
fn weights_bias_first_position() {
    let mut sorter = active_sorter(&["heavy", "light"]);
    sorter.update_weight("heavy", 3.0);

    let share = first_share(&mut sorter, "heavy");
    assert!((share - 0.75).abs() < 0.03, "heavy led {share}");
}

#[test]
fn equal_weights_are_uniform() {
    let mut sorter = active_sorter(&["a", "b", "c", "d"]);
    let share = first_share(&mut sorter, "c");
    assert!((share - 0.25).abs() < 0.03, "c led {share}");
}

#[test]
fn fairness_is_per_level() {
    // One client under "big", nine under "small": with equal group
    // weights the lone client still leads half the time.
    let mut paths = vec!["big/only".to_string()];
    paths.extend((0..9).map(|i| format!("small/{i}")));
    let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
    let mut sorter = active_sorter(&paths);

    let share = first_share(&mut sorter, "big/only");
    assert!((share - 0.5).abs() < 0.03, "big/only led {share}");
}

#[test]
fn weight_set_before_client_exists_applies() {
    let mut sorter = RandomSorter::seeded(8);
    sorter.update_weight("x", 2.0);
    assert!(!sorter.contains("x"));

    sorter.add("x").unwrap();
    sorter.add("y").unwrap();
    sorter.activate("x").unwrap();
    sorter.activate("y").unwrap();

    assert_eq!(sorter.weight("x"), 2.0);
    let share = first_share(&mut sorter, "x");
    assert!((share - 2.0 / 3.0).abs() < 0.03, "x led {share}");
}

#[test]
fn weights_survive_remove_and_add() {
    let mut sorter = active_sorter(&["x", "y"]);
    sorter.update_weight("x", 4.0);
    sorter.remove("x").unwrap();
    sorter.add("x").unwrap();
    sorter.activate("x").unwrap();

    let share = first_share(&mut sorter, "x");
    assert!((share - 0.8).abs() < 0.03, "x led {share}");
}

#[test]
fn same_seed_same_orders() {
    let build = || {
        let mut sorter = RandomSorter::with_rng(StdRng::seed_from_u64(77));
        for path in ["a", "b/c", "b/d", "e"] {
            sorter.add(path).unwrap();
            sorter.activate(path).unwrap();
        }
        sorter
    };
    let mut left = build();
    let mut right = build();

    for _ in 0..20 {
        assert_eq!(left.sort(), right.sort());
    }
}

#[test]
fn active_internal_nodes_track_active_leaves() {
    let mut sorter = RandomSorter::seeded(3);
    for path in ["eng/ml/train", "eng/web", "ops/db"] {
        sorter.add(path).unwrap();
    }
    sorter.activate("eng/ml/train").unwrap();

    let active = sorter.active_internal_nodes();
    assert_eq!(active, HashSet::from(["".to_string(), "eng".to_string(), "eng/ml".to_string()]));

    sorter.deactivate("eng/ml/train").unwrap();
    sorter.activate("ops/db").unwrap();
    let active = sorter.active_internal_nodes();
    assert_eq!(active, HashSet::from(["".to_string(), "ops".to_string()]));
}

#[test]
fn config_built_sorter_applies_weights() {
    let config = SorterConfig::from_toml_str(
        r#"
seed = 5

[weights]
"a" = 9.0
"#,
    )
    .unwrap();
    let mut sorter = config.build();
    for path in ["a", "b"] {
        sorter.add(path).unwrap();
        sorter.activate(path).unwrap();
    }

    let share = first_share(&mut sorter, "a");
    assert!((share - 0.9).abs() < 0.03, "a led {share}");
}
