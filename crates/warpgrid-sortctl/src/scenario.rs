//! Scenario files: a sorter configuration plus the cluster state to
//! load into it.
//!
//! ```toml
//! seed = 7
//!
//! [weights]
//! "eng" = 3.0
//!
//! [[agents]]
//! id = "agent-1"
//! resources = [{ name = "cpus", value = 16.0 }]
//!
//! [[clients]]
//! path = "eng/ml"
//! active = true
//!
//! [[clients.allocations]]
//! agent = "agent-1"
//! resources = [{ name = "cpus", value = 4.0 }]
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use warpgrid_resources::{AgentId, Resources};
use warpgrid_sorter::{RandomSorter, SorterConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(flatten)]
    pub sorter: SorterConfig,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub clients: Vec<ClientSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSpec {
    pub id: AgentId,
    pub resources: Resources,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSpec {
    pub path: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub allocations: Vec<AllocationSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationSpec {
    pub agent: AgentId,
    pub resources: Resources,
}

impl Scenario {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build a sorter and replay the agents and clients into it.
    pub fn load(&self) -> anyhow::Result<RandomSorter> {
        let mut sorter = self.sorter.build();

        for agent in &self.agents {
            sorter.add_total(&agent.id, &agent.resources);
        }

        for client in &self.clients {
            sorter
                .add(&client.path)
                .with_context(|| format!("adding client {}", client.path))?;
            if client.active {
                sorter.activate(&client.path)?;
            }
            for allocation in &client.allocations {
                sorter.allocated(&client.path, &allocation.agent, &allocation.resources)?;
            }
            debug!(client = %client.path, active = client.active, "loaded client");
        }

        Ok(sorter)
    }
}
