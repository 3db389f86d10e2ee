//! In-memory graph model: nodes, directed edges, dependency order.
//!
//! The [`Graph`] owns [`WorkflowNode`]s and [`Edge`]s in a petgraph
//! `StableDiGraph` with a string-id index on top. Mutation goes through the
//! explicit add/update/remove operations consumed by the (external) canvas
//! layer; traversal ([`Graph::topological_order`], reachability,
//! predecessors) is what the execution engine builds its dispatch order from.

mod model;
mod traversal;
mod types;

pub use model::Graph;
pub use types::{Edge, Position, WorkflowNode};
