//! Dependency tree traversal.
//!
//! The walk is depth-first pre-order over an explicit work stack, children
//! visited in the order the tree document lists them. Each frame carries the
//! ancestor path below the synthetic root, so a discovery's chain starts at a
//! direct dependency of the project.
//!
//! Every node is descended into. A parsed document is finite and acyclic, and
//! npm nests older copies of a package below newer copies of the same name.

use crate::harvest::normalize::VulnerabilityIndex;
use crate::harvest::traits::HarvestStage;
use crate::model::{DependencyTreeNode, DiscoveryRecord};
use tracing::debug;

struct Frame<'t> {
    node: &'t DependencyTreeNode,
    path: Vec<&'t str>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TreeWalker;

impl TreeWalker {
    /// Emits one record per occurrence of a vulnerable package in `root`.
    pub fn walk(&self, root: &DependencyTreeNode, index: &VulnerabilityIndex) -> Vec<DiscoveryRecord> {
        let mut discoveries = Vec::new();
        if index.is_empty() {
            return discoveries;
        }

        let mut stack = vec![Frame {
            node: root,
            path: Vec::new(),
        }];

        while let Some(frame) = stack.pop() {
            // The root frame has an empty path and is never a match target.
            if !frame.path.is_empty() {
                if let Some(detail) = index.detail(&frame.node.name) {
                    discoveries.push(DiscoveryRecord {
                        package: frame.node.name.clone(),
                        version: frame.node.version.clone(),
                        parent_chain: frame.path.iter().map(|s| s.to_string()).collect(),
                        severity: detail.severity,
                        advisory_url: detail.advisory_url,
                    });
                }
            }

            // Reversed so the first listed child is popped first.
            for child in frame.node.dependencies.iter().rev() {
                let mut path = frame.path.clone();
                path.push(child.name.as_str());
                stack.push(Frame { node: child, path });
            }
        }

        debug!(discoveries = discoveries.len(), "Tree walk finished");
        discoveries
    }
}

impl<'a> HarvestStage<'a> for TreeWalker {
    type Input = (&'a DependencyTreeNode, &'a VulnerabilityIndex);
    type Output = Vec<DiscoveryRecord>;

    fn execute(&self, (root, index): Self::Input) -> Self::Output {
        self.walk(root, index)
    }

    fn stage_name(&self) -> &'static str {
        "walk"
    }
}
