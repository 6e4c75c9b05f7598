//! warpgrid-resources — the resource model shared by the allocator crates.
//!
//! Agents advertise [`Resources`]; allocators hand slices of them to
//! clients. Two views are provided:
//!
//! - **`resources`** — [`Resource`], [`Value`] and the [`Resources`]
//!   multiset, including shareable instances that may be claimed by many
//!   allocations at once.
//! - **`quantities`** — [`ResourceQuantities`], the name → scalar
//!   projection used for aggregate fairness comparisons.
//!
//! Scalars are kept at a fixed precision of three decimal places so that
//! repeated add/subtract cycles return to exactly the value they started at.

pub mod quantities;
pub mod resources;

pub use quantities::ResourceQuantities;
pub use resources::{AgentId, Resource, Resources, Value};
