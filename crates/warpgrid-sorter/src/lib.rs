//! warpgrid-sorter — fair-share ordering of hierarchical clients.
//!
//! Clients are named by `/`-separated paths (`team/project/job`). On each
//! allocation cycle the allocator asks the sorter for the order in which
//! clients should be offered resources. The order is random, weighted by
//! configured shares, and fair per level of the hierarchy.
//!
//! # Architecture
//!
//! ```text
//! RandomSorter
//!   ├── Tree (arena of nodes, parent links as NodeId)
//!   │     └── Node { label, kind, children, allocation, cached weight }
//!   ├── clients: path → leaf NodeId
//!   ├── weights: path → share override
//!   └── total: cluster-wide Allocation (all known resources)
//! ```
//!
//! # Components
//!
//! - **`tree`** — node arena; insert/remove with split and collapse
//! - **`allocation`** — per-agent resources plus scalar totals
//! - **`shuffle`** — weighted random permutation
//! - **`sorter`** — [`RandomSorter`], the only entry point
//! - **`config`** — [`SorterConfig`] loaded from TOML

pub mod allocation;
pub mod config;
pub mod error;
pub mod shuffle;
pub mod sorter;
pub mod tree;

pub use allocation::Allocation;
pub use config::SorterConfig;
pub use error::{SorterError, SorterResult};
pub use shuffle::weighted_shuffle;
pub use sorter::{DEFAULT_WEIGHT, RandomSorter, SorterLabels};
