//! Resources advertised by agents and held by allocations.
//!
//! A [`Resources`] value is a multiset of [`Resource`] entries:
//! - exclusive (non-shared) entries with the same name and value kind are
//!   merged, so `cpus:1 + cpus:2 == cpus:3`;
//! - shareable entries are only identical when name, value and sharing id
//!   all match, and identical instances are counted rather than merged.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Identifier of a pool unit (an agent / machine) in the cluster.
pub type AgentId = String;

const SCALAR_PRECISION: f64 = 1000.0;

pub(crate) fn round_scalar(value: f64) -> f64 {
    (value * SCALAR_PRECISION).round() / SCALAR_PRECISION
}

// ── Value ──────────────────────────────────────────────────────────

/// The amount carried by a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A divisible amount (cpus, mem, disk).
    Scalar(f64),
    /// A set of named items (e.g. device ids).
    Set(BTreeSet<String>),
}

impl Value {
    fn same_kind(&self, other: &Value) -> bool {
        matches!(
            (self, other),
            (Value::Scalar(_), Value::Scalar(_)) | (Value::Set(_), Value::Set(_))
        )
    }

    fn is_empty(&self) -> bool {
        match self {
            Value::Scalar(v) => round_scalar(*v) <= 0.0,
            Value::Set(items) => items.is_empty(),
        }
    }

    fn merge(&mut self, other: &Value) {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => *a = round_scalar(*a + *b),
            (Value::Set(a), Value::Set(b)) => a.extend(b.iter().cloned()),
            _ => {}
        }
    }

    fn remove(&mut self, other: &Value) {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => *a = round_scalar(*a - *b),
            (Value::Set(a), Value::Set(b)) => a.retain(|item| !b.contains(item)),
            _ => {}
        }
    }

    fn covers(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => round_scalar(*a - *b) >= 0.0,
            (Value::Set(a), Value::Set(b)) => b.is_subset(a),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => round_scalar(*a) == round_scalar(*b),
            (Value::Set(a), Value::Set(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{}", round_scalar(*v)),
            Value::Set(items) => {
                let items: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", items.join(","))
            }
        }
    }
}

// ── Resource ───────────────────────────────────────────────────────

/// A single named resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub value: Value,
    /// Sharing id of a shareable instance (e.g. a persistent volume).
    /// `None` for exclusive resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared: Option<String>,
}

impl Resource {
    pub fn scalar(name: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            value: Value::Scalar(round_scalar(amount)),
            shared: None,
        }
    }

    pub fn set<I, S>(name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            value: Value::Set(items.into_iter().map(Into::into).collect()),
            shared: None,
        }
    }

    /// Mark this resource as a shareable instance identified by `id`.
    pub fn shareable(mut self, id: impl Into<String>) -> Self {
        self.shared = Some(id.into());
        self
    }

    pub fn is_shared(&self) -> bool {
        self.shared.is_some()
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.value, Value::Scalar(_))
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Whether two exclusive resources belong in the same merged entry.
    fn merges_with(&self, other: &Resource) -> bool {
        !self.is_shared()
            && !other.is_shared()
            && self.name == other.name
            && self.value.same_kind(&other.value)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shared {
            Some(id) => write!(f, "{}(shared {}):{}", self.name, id, self.value),
            None => write!(f, "{}:{}", self.name, self.value),
        }
    }
}

// ── Resources ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
    resource: Resource,
    /// Number of identical instances; always 1 for exclusive entries.
    count: usize,
}

/// A multiset of resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Resource>", into = "Vec<Resource>")]
pub struct Resources {
    entries: Vec<Entry>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over every resource, repeating shared instances by count.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.entries
            .iter()
            .flat_map(|e| std::iter::repeat_n(&e.resource, e.count))
    }

    pub fn add_resource(&mut self, resource: &Resource) {
        if resource.is_empty() {
            return;
        }

        if resource.is_shared() {
            match self.entries.iter_mut().find(|e| e.resource == *resource) {
                Some(entry) => entry.count += 1,
                None => self.entries.push(Entry {
                    resource: resource.clone(),
                    count: 1,
                }),
            }
            return;
        }

        match self
            .entries
            .iter_mut()
            .find(|e| e.resource.merges_with(resource))
        {
            Some(entry) => entry.resource.value.merge(&resource.value),
            None => self.entries.push(Entry {
                resource: resource.clone(),
                count: 1,
            }),
        }
    }

    /// Remove `resource`. Removing something not held is a no-op for the
    /// missing part; callers check [`Resources::contains`] first.
    pub fn subtract_resource(&mut self, resource: &Resource) {
        if resource.is_empty() {
            return;
        }

        let position = if resource.is_shared() {
            self.entries.iter().position(|e| e.resource == *resource)
        } else {
            self.entries
                .iter()
                .position(|e| e.resource.merges_with(resource))
        };
        let Some(index) = position else { return };

        let entry = &mut self.entries[index];
        if resource.is_shared() {
            entry.count -= 1;
            if entry.count == 0 {
                self.entries.remove(index);
            }
        } else {
            entry.resource.value.remove(&resource.value);
            if entry.resource.is_empty() {
                self.entries.remove(index);
            }
        }
    }

    /// Whether at least one instance of `resource` is held.
    pub fn contains_resource(&self, resource: &Resource) -> bool {
        if resource.is_shared() {
            return self.entries.iter().any(|e| e.resource == *resource);
        }
        self.entries
            .iter()
            .any(|e| e.resource.merges_with(resource) && e.resource.value.covers(&resource.value))
    }

    /// Whether every resource in `other` (with multiplicity) is held.
    pub fn contains(&self, other: &Resources) -> bool {
        let mut remaining = self.clone();
        for resource in other.iter() {
            if !remaining.contains_resource(resource) {
                return false;
            }
            remaining.subtract_resource(resource);
        }
        true
    }

    /// Keep the entries (with their instance counts) matching `predicate`.
    pub fn filter(&self, predicate: impl Fn(&Resource) -> bool) -> Resources {
        Resources {
            entries: self
                .entries
                .iter()
                .filter(|e| predicate(&e.resource))
                .cloned()
                .collect(),
        }
    }

    /// One instance of each entry, dropping repeated shared instances.
    pub fn distinct(&self) -> Resources {
        Resources {
            entries: self
                .entries
                .iter()
                .map(|e| Entry {
                    resource: e.resource.clone(),
                    count: 1,
                })
                .collect(),
        }
    }

    pub fn shared(&self) -> Resources {
        self.filter(Resource::is_shared)
    }

    pub fn non_shared(&self) -> Resources {
        self.filter(|r| !r.is_shared())
    }

    pub fn scalars(&self) -> Resources {
        self.filter(Resource::is_scalar)
    }
}

impl PartialEq for Resources {
    fn eq(&self, other: &Self) -> bool {
        self.contains(other) && other.contains(self)
    }
}

impl From<Resource> for Resources {
    fn from(resource: Resource) -> Self {
        let mut resources = Resources::new();
        resources.add_resource(&resource);
        resources
    }
}

impl From<Vec<Resource>> for Resources {
    fn from(list: Vec<Resource>) -> Self {
        list.into_iter().collect()
    }
}

impl From<Resources> for Vec<Resource> {
    fn from(resources: Resources) -> Self {
        resources.iter().cloned().collect()
    }
}

impl FromIterator<Resource> for Resources {
    fn from_iter<T: IntoIterator<Item = Resource>>(iter: T) -> Self {
        let mut resources = Resources::new();
        for resource in iter {
            resources.add_resource(&resource);
        }
        resources
    }
}

impl AddAssign<&Resources> for Resources {
    fn add_assign(&mut self, rhs: &Resources) {
        for resource in rhs.iter() {
            self.add_resource(resource);
        }
    }
}

impl SubAssign<&Resources> for Resources {
    fn sub_assign(&mut self, rhs: &Resources) {
        for resource in rhs.iter() {
            self.subtract_resource(resource);
        }
    }
}

impl Add<&Resources> for &Resources {
    type Output = Resources;

    fn add(self, rhs: &Resources) -> Resources {
        let mut sum = self.clone();
        sum += rhs;
        sum
    }
}

impl Sub<&Resources> for &Resources {
    type Output = Resources;

    fn sub(self, rhs: &Resources) -> Resources {
        let mut difference = self.clone();
        difference -= rhs;
        difference
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpus(n: f64) -> Resource {
        Resource::scalar("cpus", n)
    }

    fn volume(id: &str) -> Resource {
        Resource::scalar("disk", 10.0).shareable(id)
    }

    #[test]
    fn exclusive_scalars_merge() {
        let mut r = Resources::from(cpus(1.0));
        r += &Resources::from(cpus(2.5));

        assert_eq!(r.iter().count(), 1);
        assert!(r.contains_resource(&cpus(3.5)));
        assert!(!r.contains_resource(&cpus(3.6)));
    }

    #[test]
    fn subtract_to_zero_removes_entry() {
        let mut r: Resources = vec![cpus(2.0), Resource::scalar("mem", 512.0)].into();
        r -= &Resources::from(cpus(2.0));

        assert!(!r.contains_resource(&cpus(0.001)));
        assert_eq!(r, Resources::from(Resource::scalar("mem", 512.0)));
    }

    #[test]
    fn fractional_scalars_round_trip() {
        let mut r = Resources::from(cpus(0.1));
        for _ in 0..10 {
            r += &Resources::from(cpus(0.1));
        }
        for _ in 0..10 {
            r -= &Resources::from(cpus(0.1));
        }
        assert_eq!(r, Resources::from(cpus(0.1)));
    }

    #[test]
    fn shared_instances_are_counted() {
        let mut r = Resources::from(volume("vol-1"));
        r += &Resources::from(volume("vol-1"));

        assert_eq!(r.iter().count(), 2);
        assert!(r.contains(&vec![volume("vol-1"), volume("vol-1")].into()));
        assert!(!r.contains(&vec![volume("vol-1"); 3].into()));

        r -= &Resources::from(volume("vol-1"));
        assert!(r.contains_resource(&volume("vol-1")));
        r -= &Resources::from(volume("vol-1"));
        assert!(r.is_empty());
    }

    #[test]
    fn distinct_keeps_one_instance() {
        let r: Resources = vec![
            volume("vol-1"),
            volume("vol-1"),
            volume("vol-2"),
            Resource::scalar("cpus", 2.0),
        ]
        .into();

        let once = r.distinct();
        assert_eq!(once.iter().count(), 3);
        assert!(once.contains_resource(&volume("vol-1")));
        assert!(!once.contains(&vec![volume("vol-1"), volume("vol-1")].into()));
        assert!(once.contains(&Resource::scalar("cpus", 2.0).into()));
    }

    #[test]
    fn shared_and_exclusive_do_not_merge() {
        let r: Resources = vec![Resource::scalar("disk", 10.0), volume("vol-1")].into();

        assert_eq!(r.shared(), Resources::from(volume("vol-1")));
        assert_eq!(r.non_shared(), Resources::from(Resource::scalar("disk", 10.0)));
        assert!(!r.contains_resource(&Resource::scalar("disk", 20.0)));
    }

    #[test]
    fn sets_union_and_difference() {
        let mut r = Resources::from(Resource::set("gpus", ["g0", "g1"]));
        r += &Resources::from(Resource::set("gpus", ["g2"]));
        assert!(r.contains_resource(&Resource::set("gpus", ["g0", "g2"])));

        r -= &Resources::from(Resource::set("gpus", ["g0", "g1", "g2"]));
        assert!(r.is_empty());
    }

    #[test]
    fn scalars_projection_drops_sets() {
        let r: Resources = vec![cpus(1.0), Resource::set("gpus", ["g0"])].into();
        assert_eq!(r.scalars(), Resources::from(cpus(1.0)));
    }

    #[test]
    fn serde_as_list() {
        let r: Resources = vec![cpus(2.0), volume("vol-1"), volume("vol-1")].into();
        let json = serde_json::to_string(&r).unwrap();
        let back: Resources = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }

    #[test]
    fn display_is_semicolon_separated() {
        let r: Resources = vec![cpus(2.0), Resource::scalar("mem", 128.0)].into();
        assert_eq!(r.to_string(), "cpus:2; mem:128");
    }
}
