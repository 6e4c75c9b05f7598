//! Random sorter — weighted random ordering of hierarchical clients.
//!
//! The sorter owns the client [`Tree`], a path → leaf index, the weight
//! overrides, and the cluster-wide resource total. On every allocation
//! cycle [`RandomSorter::sort`] shuffles each level of the hierarchy by
//! weight and lists the active clients in the resulting order, so
//! fairness is enforced per subtree rather than across a flat list.
//!
//! The sorter is not synchronized. The allocator owns it and calls it
//! one operation at a time.

use std::collections::{BTreeSet, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};
use warpgrid_resources::{AgentId, ResourceQuantities, Resources};

use crate::allocation::Allocation;
use crate::error::{SorterError, SorterResult};
use crate::shuffle::weighted_shuffle;
use crate::tree::{Kind, Label, NodeId, Tree};

/// Share used for paths without an override.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Telemetry labels. They never affect ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SorterLabels {
    pub allocator: Option<String>,
    pub metrics_prefix: Option<String>,
}

#[derive(Debug)]
pub struct RandomSorter<R = StdRng> {
    tree: Tree,
    /// Client path → its leaf. Exactly one entry per live client.
    clients: HashMap<String, NodeId>,
    /// Path → configured weight, whether or not a client exists there.
    weights: HashMap<String, f64>,
    /// All resources known to the allocator, allocated or not.
    total: Allocation,
    fairness_exclude_resource_names: Option<BTreeSet<String>>,
    labels: SorterLabels,
    rng: R,
}

impl RandomSorter<StdRng> {
    /// Create a sorter with an entropy-seeded generator.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Create a sorter whose orderings are reproducible for `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Create a sorter carrying the allocator's telemetry labels.
    pub fn with_labels(allocator: impl Into<String>, metrics_prefix: impl Into<String>) -> Self {
        let mut sorter = Self::new();
        sorter.labels = SorterLabels {
            allocator: Some(allocator.into()),
            metrics_prefix: Some(metrics_prefix.into()),
        };
        sorter
    }
}

impl Default for RandomSorter<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> RandomSorter<R> {
    /// Build a sorter that draws its orderings from `rng`.
    pub fn with_rng(rng: R) -> Self {
        Self {
            tree: Tree::new(),
            clients: HashMap::new(),
            weights: HashMap::new(),
            total: Allocation::default(),
            fairness_exclude_resource_names: None,
            labels: SorterLabels::default(),
            rng,
        }
    }

    /// Read-only view of the client tree.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn labels(&self) -> &SorterLabels {
        &self.labels
    }

    pub(crate) fn set_labels(&mut self, labels: SorterLabels) {
        self.labels = labels;
    }

    /// Record the resource names excluded from fairness comparisons.
    /// Random ordering does not compare shares, so this does not change
    /// how clients are ordered.
    pub fn initialize(&mut self, fairness_exclude_resource_names: Option<BTreeSet<String>>) {
        info!(
            allocator = self.labels.allocator.as_deref().unwrap_or("-"),
            excluded = ?fairness_exclude_resource_names,
            "initialized random sorter"
        );
        self.fairness_exclude_resource_names = fairness_exclude_resource_names;
    }

    pub fn fairness_exclude_resource_names(&self) -> Option<&BTreeSet<String>> {
        self.fairness_exclude_resource_names.as_ref()
    }

    // ── Clients ────────────────────────────────────────────────────

    /// Add an inactive client at `client_path`.
    pub fn add(&mut self, client_path: &str) -> SorterResult<()> {
        if self.clients.contains_key(client_path) {
            return Err(SorterError::ClientExists(client_path.to_string()));
        }
        let segments = parse_path(client_path)?;

        let insertion = self.tree.insert_client(&segments);

        if let Some(relocated) = insertion.relocated {
            let path = self.tree.node(relocated).path.clone();
            debug!(client = %path, "split client into internal node");
            self.clients.insert(path, relocated);
        }

        debug_assert_eq!(self.tree.node(insertion.leaf).path, client_path);
        self.clients.insert(client_path.to_string(), insertion.leaf);

        debug!(client = client_path, clients = self.clients.len(), "added client");
        Ok(())
    }

    /// Remove the client at `client_path` and everything it holds.
    pub fn remove(&mut self, client_path: &str) -> SorterResult<()> {
        let leaf = self.find(client_path)?;
        self.clients.remove(client_path);

        if let Some(collapsed) = self.tree.remove_client(leaf) {
            let path = self.tree.node(collapsed).path.clone();
            debug!(client = %path, "collapsed internal node into client");
            self.clients.insert(path, collapsed);
        }

        debug!(client = client_path, clients = self.clients.len(), "removed client");
        Ok(())
    }

    /// Include `client_path` in `sort`.
    pub fn activate(&mut self, client_path: &str) -> SorterResult<()> {
        let leaf = self.find(client_path)?;
        if self.tree.set_active(leaf, true) {
            debug!(client = client_path, "activated client");
        }
        Ok(())
    }

    /// Keep `client_path` (and its allocations) but leave it out of `sort`.
    pub fn deactivate(&mut self, client_path: &str) -> SorterResult<()> {
        let leaf = self.find(client_path)?;
        if self.tree.set_active(leaf, false) {
            debug!(client = client_path, "deactivated client");
        }
        Ok(())
    }

    /// Set the weight for `path`. The override is kept even when no
    /// client or internal node exists there yet.
    pub fn update_weight(&mut self, path: &str, weight: f64) {
        if !(weight > 0.0 && weight.is_finite()) {
            warn!(path, weight, "non-positive weight; path will sort last");
        }
        self.weights.insert(path.to_string(), weight);

        // A split client resolves to the internal node at its path, never
        // to its coincident leaf.
        let Ok(segments) = parse_path(path) else {
            return;
        };
        if let Some(node) = self.tree.lookup(&segments) {
            self.tree.node_mut(node).weight = None;
        }
        debug!(path, weight, "updated weight");
    }

    /// Configured weight for `path`, or the default.
    pub fn weight(&self, path: &str) -> f64 {
        self.weights.get(path).copied().unwrap_or(DEFAULT_WEIGHT)
    }

    /// Whether `client_path` is a registered client.
    pub fn contains(&self, client_path: &str) -> bool {
        self.clients.contains_key(client_path)
    }

    /// Number of registered clients, active or not.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    pub fn clients(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    pub fn is_active(&self, client_path: &str) -> SorterResult<bool> {
        let leaf = self.find(client_path)?;
        Ok(self.tree.node(leaf).kind == Kind::ActiveLeaf)
    }

    // ── Allocation accounting ──────────────────────────────────────

    /// Record `resources` on `agent` as allocated to `client_path`.
    pub fn allocated(&mut self, client_path: &str, agent: &str, resources: &Resources) -> SorterResult<()> {
        let leaf = self.find(client_path)?;
        for id in self.tree.ancestry(leaf) {
            self.tree.node_mut(id).allocation.add(agent, resources);
        }
        Ok(())
    }

    /// Replace `old` with `new` in the client's allocation on `agent`.
    pub fn update(
        &mut self,
        client_path: &str,
        agent: &str,
        old: &Resources,
        new: &Resources,
    ) -> SorterResult<()> {
        let leaf = self.find(client_path)?;
        self.check_holds(leaf, agent, old)?;
        for id in self.tree.ancestry(leaf) {
            self.tree.node_mut(id).allocation.update(agent, old, new);
        }
        Ok(())
    }

    /// Return `resources` on `agent` from `client_path`.
    pub fn unallocated(&mut self, client_path: &str, agent: &str, resources: &Resources) -> SorterResult<()> {
        let leaf = self.find(client_path)?;
        self.check_holds(leaf, agent, resources)?;
        for id in self.tree.ancestry(leaf) {
            self.tree.node_mut(id).allocation.subtract(agent, resources);
        }
        Ok(())
    }

    /// Per-agent resources allocated to `client_path`.
    pub fn allocation(&self, client_path: &str) -> SorterResult<&HashMap<AgentId, Resources>> {
        let leaf = self.find(client_path)?;
        Ok(&self.tree.node(leaf).allocation.resources)
    }

    /// Resources allocated to `client_path` on `agent`; empty if none.
    pub fn allocation_on(&self, client_path: &str, agent: &str) -> SorterResult<Resources> {
        let leaf = self.find(client_path)?;
        Ok(self.tree.node(leaf).allocation.on_agent(agent))
    }

    /// Every client holding resources on `agent`, with what it holds.
    pub fn allocations_on_agent(&self, agent: &str) -> HashMap<String, Resources> {
        // Leaves are exactly the clients, so the index is enough.
        self.clients
            .iter()
            .filter_map(|(path, &leaf)| {
                self.tree
                    .node(leaf)
                    .allocation
                    .resources
                    .get(agent)
                    .map(|resources| (path.clone(), resources.clone()))
            })
            .collect()
    }

    pub fn allocation_scalar_quantities(&self, client_path: &str) -> SorterResult<&ResourceQuantities> {
        let leaf = self.find(client_path)?;
        Ok(&self.tree.node(leaf).allocation.totals)
    }

    /// Scalar quantities allocated across all clients.
    pub fn cluster_allocation_scalar_quantities(&self) -> &ResourceQuantities {
        &self.tree.node(self.tree.root()).allocation.totals
    }

    // ── Cluster total ──────────────────────────────────────────────

    pub fn add_total(&mut self, agent: &str, resources: &Resources) {
        self.total.add(agent, resources);
        trace!(agent, %resources, "added to total");
    }

    pub fn remove_total(&mut self, agent: &str, resources: &Resources) -> SorterResult<()> {
        if !self.total.holds(agent, resources) {
            return Err(SorterError::InsufficientResources {
                holder: "cluster total".to_string(),
                agent: agent.to_string(),
                requested: resources.to_string(),
            });
        }
        self.total.subtract(agent, resources);
        trace!(agent, %resources, "removed from total");
        Ok(())
    }

    pub fn total_scalar_quantities(&self) -> &ResourceQuantities {
        &self.total.totals
    }

    /// Total resources known on `agent`; empty if none.
    pub fn total_resources(&self, agent: &str) -> Resources {
        self.total.on_agent(agent)
    }

    // ── Ordering ───────────────────────────────────────────────────

    /// Shuffle every level of the tree by weight and return the active
    /// clients in pre-order. Each call draws a fresh order.
    pub fn sort(&mut self) -> Vec<String> {
        self.shuffle_tree();
        let order = self.tree.active_leaves();
        trace!(clients = order.len(), "sorted clients");
        order
    }

    /// Paths of the internal nodes with an active client below them.
    /// The root is reported as the empty path.
    pub fn active_internal_nodes(&self) -> HashSet<String> {
        self.tree
            .active_internal_nodes()
            .into_iter()
            .map(|id| self.tree.node(id).path.clone())
            .collect()
    }

    fn shuffle_tree(&mut self) {
        let mut pending = vec![self.tree.root()];

        while let Some(id) = pending.pop() {
            let active = self.tree.active_prefix_len(id);
            let mut children = self.tree.node(id).children[..active].to_vec();
            let weights: Vec<f64> = children.iter().map(|&c| self.resolve_weight(c)).collect();

            weighted_shuffle(&mut children, &weights, &mut self.rng);

            self.tree.node_mut(id).children[..active].copy_from_slice(&children);
            pending.extend(
                children
                    .into_iter()
                    .filter(|&c| self.tree.node(c).kind == Kind::Internal),
            );
        }
    }

    fn resolve_weight(&mut self, id: NodeId) -> f64 {
        let weights = &self.weights;
        let node = self.tree.node_mut(id);
        if let Some(weight) = node.weight {
            return weight;
        }
        let weight = match node.label {
            // The coincident leaf has no path of its own to configure.
            Label::Coincident => DEFAULT_WEIGHT,
            _ => weights.get(&node.path).copied().unwrap_or(DEFAULT_WEIGHT),
        };
        node.weight = Some(weight);
        weight
    }

    // ── Lookup and checks ──────────────────────────────────────────

    fn find(&self, client_path: &str) -> SorterResult<NodeId> {
        let leaf = self
            .clients
            .get(client_path)
            .copied()
            .ok_or_else(|| SorterError::UnknownClient(client_path.to_string()))?;
        assert!(self.tree.node(leaf).kind.is_leaf(), "client {client_path} is not a leaf");
        Ok(leaf)
    }

    fn check_holds(&self, leaf: NodeId, agent: &str, resources: &Resources) -> SorterResult<()> {
        let node = self.tree.node(leaf);
        if node.allocation.holds(agent, resources) {
            return Ok(());
        }
        Err(SorterError::InsufficientResources {
            holder: node.path.clone(),
            agent: agent.to_string(),
            requested: resources.to_string(),
        })
    }

    /// Check the structural and accounting invariants of the tree and
    /// the client index.
    pub fn verify(&self) -> SorterResult<()> {
        let mut leaves = 0;
        self.verify_node(self.tree.root(), &mut leaves)?;

        if leaves != self.clients.len() {
            return Err(inconsistent(format!(
                "{leaves} leaves but {} indexed clients",
                self.clients.len()
            )));
        }
        for (path, &leaf) in &self.clients {
            let node = self.tree.node(leaf);
            if !node.kind.is_leaf() {
                return Err(inconsistent(format!("client {path} is not a leaf")));
            }
            if node.path != *path {
                return Err(inconsistent(format!("client {path} resolves to {}", node.path)));
            }
        }
        Ok(())
    }

    fn verify_node(&self, id: NodeId, leaves: &mut usize) -> SorterResult<()> {
        let node = self.tree.node(id);

        if node.kind.is_leaf() {
            if !node.children.is_empty() {
                return Err(inconsistent(format!("leaf {} has children", node.path)));
            }
            *leaves += 1;
            return Ok(());
        }

        if node.children.is_empty() && id != self.tree.root() {
            return Err(inconsistent(format!("internal node {} has no children", node.path)));
        }

        let mut seen_inactive = false;
        let mut coincident = 0;
        let mut sum = Allocation::default();

        for &child_id in &node.children {
            let child = self.tree.node(child_id);
            if child.parent != Some(id) {
                return Err(inconsistent(format!("{} has a stale parent link", child.path)));
            }
            match child.kind {
                Kind::InactiveLeaf => seen_inactive = true,
                _ if seen_inactive => {
                    return Err(inconsistent(format!(
                        "{} follows an inactive sibling",
                        child.path
                    )));
                }
                _ => {}
            }
            if child.label == Label::Coincident {
                coincident += 1;
            }
            for (agent, resources) in &child.allocation.resources {
                sum.add(agent, resources);
            }
            self.verify_node(child_id, leaves)?;
        }

        if coincident > 1 || (coincident == 1 && node.children.len() == 1) {
            return Err(inconsistent(format!("{} should have collapsed", node.path)));
        }
        if sum != node.allocation {
            return Err(inconsistent(format!(
                "allocation of {:?} is not the sum of its children",
                node.path
            )));
        }
        Ok(())
    }
}

fn inconsistent(message: String) -> SorterError {
    SorterError::Inconsistent(message)
}

/// Split a client path into its `/`-separated segments.
fn parse_path(path: &str) -> SorterResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(SorterError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}
