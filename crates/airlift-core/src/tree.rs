use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::ResolvedArtifact;
use crate::ecosystem::Ecosystem;

/// One node in a dependency tree: a pinned artifact plus its children in
/// resolution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyNode {
    pub artifact: ResolvedArtifact,
    /// Optional/recommended dependencies carry this flag so the bundle can
    /// include or skip them per policy.
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DependencyNode>,
}

impl DependencyNode {
    pub fn new(artifact: ResolvedArtifact) -> Self {
        Self {
            artifact,
            optional: false,
            children: Vec::new(),
        }
    }

    /// Depth-first walk collecting every artifact key in the subtree.
    fn collect_keys(&self, out: &mut HashSet<String>) {
        out.insert(self.artifact.key());
        for child in &self.children {
            child.collect_keys(out);
        }
    }
}

/// A rooted tree for one user request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyTree {
    pub root: DependencyNode,
}

impl DependencyTree {
    pub fn new(root: DependencyNode) -> Self {
        Self { root }
    }

    /// Every artifact key that appears anywhere in the tree.
    pub fn keys(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        self.root.collect_keys(&mut out);
        out
    }

    /// Render the tree as an indented listing for diagnostics.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {}\n",
            self.root.artifact.name, self.root.artifact.version
        ));
        let count = self.root.children.len();
        for (i, child) in self.root.children.iter().enumerate() {
            render_subtree(&mut out, child, "", i == count - 1);
        }
        out
    }
}

fn render_subtree(out: &mut String, node: &DependencyNode, prefix: &str, is_last: bool) {
    let connector = if is_last { "└── " } else { "├── " };
    let marker = if node.optional { " (optional)" } else { "" };
    out.push_str(&format!(
        "{prefix}{connector}{} {}{marker}\n",
        node.artifact.name, node.artifact.version
    ));
    let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        render_subtree(out, child, &child_prefix, i == count - 1);
    }
}

/// A recorded resolution conflict. Conflicts are data, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum Conflict {
    /// Two paths pinned the same package to incompatible versions; the
    /// first-seen (BFS order) pin won.
    VersionMismatch {
        ecosystem: Ecosystem,
        name: String,
        kept: String,
        rejected: String,
        /// Key of the package whose edge lost.
        requested_by: String,
    },
    /// A dependency edge closed a cycle; expansion stopped at the edge.
    Circular {
        ecosystem: Ecosystem,
        /// The node re-entered.
        name: String,
        version: String,
        /// The node whose edge closed the cycle.
        via: String,
    },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::VersionMismatch {
                ecosystem,
                name,
                kept,
                rejected,
                requested_by,
            } => write!(
                f,
                "{ecosystem}:{name}: kept {kept}, rejected {rejected} (requested by {requested_by})"
            ),
            Conflict::Circular {
                ecosystem,
                name,
                version,
                via,
            } => write!(f, "{ecosystem}:{name}:{version}: cycle via {via}"),
        }
    }
}

/// A dependency that could not be resolved or selected; the session
/// continues without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedPackage {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub requested_version: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}
