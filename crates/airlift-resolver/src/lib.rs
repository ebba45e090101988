//! The generic dependency resolver: breadth-first graph expansion over
//! the adapter contract, producing per-request trees, a de-duplicated
//! flat list, and a conflict report.

pub mod graph;
pub mod resolver;

pub use graph::ArtifactGraph;
pub use resolver::{resolve, Resolution};
