//! Per-agent resource accounting.
//!
//! An [`Allocation`] pairs the raw resources held on each agent with their
//! aggregate scalar quantities. The same record backs every tree node
//! (resources allocated to the subtree) and the sorter's cluster total.
//!
//! Shareable resources are special: many claims on one shareable instance
//! consume one unit of capacity, so an instance only counts towards
//! `totals` while at least one copy of it is held on the agent.

use std::collections::HashMap;

use serde::Serialize;
use warpgrid_resources::{AgentId, ResourceQuantities, Resources};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Allocation {
    pub resources: HashMap<AgentId, Resources>,
    pub totals: ResourceQuantities,
}

impl Allocation {
    /// Whether `agent` currently holds all of `requested`.
    pub fn holds(&self, agent: &str, requested: &Resources) -> bool {
        requested.is_empty()
            || self
                .resources
                .get(agent)
                .is_some_and(|held| held.contains(requested))
    }

    pub fn add(&mut self, agent: &str, to_add: &Resources) {
        if to_add.is_empty() {
            return;
        }

        let held = self.resources.entry(agent.to_string()).or_default();
        let new_shared = to_add
            .shared()
            .distinct()
            .filter(|resource| !held.contains_resource(resource));

        *held += to_add;
        self.totals += &ResourceQuantities::from_scalar_resources(
            &(&to_add.non_shared() + &new_shared).scalars(),
        );
    }

    /// Remove `to_remove` from `agent`. The caller has checked
    /// [`Allocation::holds`].
    pub fn subtract(&mut self, agent: &str, to_remove: &Resources) {
        if to_remove.is_empty() {
            return;
        }
        debug_assert!(self.holds(agent, to_remove), "{agent} does not hold {to_remove}");

        let Some(held) = self.resources.get_mut(agent) else {
            return;
        };
        *held -= to_remove;

        let absent_shared = to_remove
            .shared()
            .distinct()
            .filter(|resource| !held.contains_resource(resource));
        let quantities = ResourceQuantities::from_scalar_resources(
            &(&to_remove.non_shared() + &absent_shared).scalars(),
        );
        debug_assert!(self.totals.contains(&quantities));
        self.totals -= &quantities;

        if held.is_empty() {
            self.resources.remove(agent);
        }
    }

    /// Replace `old` with `new` on `agent`. The caller has checked that
    /// `old` is held.
    pub fn update(&mut self, agent: &str, old: &Resources, new: &Resources) {
        debug_assert!(self.holds(agent, old), "{agent} does not hold {old}");

        let held = self.resources.entry(agent.to_string()).or_default();
        *held -= old;

        // Shared instances leave the totals only when no copy remains, and
        // enter them only when none was left behind.
        let absent_shared = old
            .shared()
            .distinct()
            .filter(|resource| !held.contains_resource(resource));
        let new_shared = new
            .shared()
            .distinct()
            .filter(|resource| !held.contains_resource(resource));

        *held += new;
        if held.is_empty() {
            self.resources.remove(agent);
        }

        self.totals -= &ResourceQuantities::from_scalar_resources(
            &(&old.non_shared() + &absent_shared).scalars(),
        );
        self.totals += &ResourceQuantities::from_scalar_resources(
            &(&new.non_shared() + &new_shared).scalars(),
        );
    }

    /// Resources held on `agent`; empty when nothing is held there.
    pub fn on_agent(&self, agent: &str) -> Resources {
        self.resources.get(agent).cloned().unwrap_or_default()
    }
}
