//! Scalar resource quantities.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{AddAssign, SubAssign};

use serde::{Deserialize, Serialize};

use crate::resources::{Resources, Value, round_scalar};

/// Name → scalar amount, independent of resource identity or sharing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceQuantities(BTreeMap<String, f64>);

impl ResourceQuantities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum the scalar resources in `resources` by name. Non-scalar
    /// resources are ignored.
    pub fn from_scalar_resources(resources: &Resources) -> Self {
        let mut quantities = Self::new();
        for resource in resources.iter() {
            if let Value::Scalar(amount) = resource.value {
                quantities.add(&resource.name, amount);
            }
        }
        quantities
    }

    /// Amount held for `name`; zero when absent.
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, amount)| (name.as_str(), *amount))
    }

    pub fn contains(&self, other: &ResourceQuantities) -> bool {
        other
            .iter()
            .all(|(name, amount)| round_scalar(self.get(name) - amount) >= 0.0)
    }

    fn add(&mut self, name: &str, amount: f64) {
        let slot = self.0.entry(name.to_string()).or_insert(0.0);
        *slot = round_scalar(*slot + amount);
        if *slot <= 0.0 {
            self.0.remove(name);
        }
    }
}

impl AddAssign<&ResourceQuantities> for ResourceQuantities {
    fn add_assign(&mut self, rhs: &ResourceQuantities) {
        for (name, amount) in rhs.iter() {
            self.add(name, amount);
        }
    }
}

impl SubAssign<&ResourceQuantities> for ResourceQuantities {
    fn sub_assign(&mut self, rhs: &ResourceQuantities) {
        for (name, amount) in rhs.iter() {
            self.add(name, -amount);
        }
    }
}

impl fmt::Display for ResourceQuantities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(name, amount)| format!("{name}:{amount}"))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Resource;

    #[test]
    fn projection_sums_scalars_by_name() {
        let r: Resources = vec![
            Resource::scalar("cpus", 2.0),
            Resource::scalar("disk", 5.0),
            Resource::scalar("disk", 10.0).shareable("vol-1"),
            Resource::set("gpus", ["g0"]),
        ]
        .into();

        let q = ResourceQuantities::from_scalar_resources(&r);
        assert_eq!(q.get("cpus"), 2.0);
        assert_eq!(q.get("disk"), 15.0);
        assert_eq!(q.get("gpus"), 0.0);
    }

    #[test]
    fn subtracting_to_zero_drops_name() {
        let mut q = ResourceQuantities::from_scalar_resources(&Resource::scalar("mem", 64.0).into());
        let same = q.clone();
        q -= &same;
        assert!(q.is_empty());
    }

    #[test]
    fn contains_compares_per_name() {
        let big = ResourceQuantities::from_scalar_resources(
            &vec![Resource::scalar("cpus", 4.0), Resource::scalar("mem", 64.0)].into(),
        );
        let small = ResourceQuantities::from_scalar_resources(&Resource::scalar("cpus", 1.5).into());
        let other = ResourceQuantities::from_scalar_resources(&Resource::scalar("gpus", 1.0).into());

        assert!(big.contains(&small));
        assert!(!small.contains(&big));
        assert!(!big.contains(&other));
    }
}
