use crate::harvest::traits::HarvestStage;
use crate::model::{CanonicalRow, UpgradeGroup};
use std::collections::{HashMap, HashSet};

/// Groups canonical rows under the direct dependency that pulls them in.
///
/// Upgrading a top-level dependency is the remediation a project can apply
/// without forking its dependency graph, so each group names one such
/// dependency and the vulnerable packages reachable through it.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpgradeReducer;

impl UpgradeReducer {
    pub fn reduce(&self, rows: &[CanonicalRow]) -> Vec<UpgradeGroup> {
        let mut groups: Vec<UpgradeGroup> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut members: HashSet<(usize, &str)> = HashSet::new();

        for row in rows {
            // Empty chains have no ancestor to upgrade.
            let Some(parent) = row.top_level_parent() else {
                continue;
            };

            let group = *positions.entry(parent).or_insert_with(|| {
                groups.push(UpgradeGroup {
                    parent: parent.to_string(),
                    packages: Vec::new(),
                });
                groups.len() - 1
            });

            if members.insert((group, row.package.as_str())) {
                groups[group].packages.push(row.package.clone());
            }
        }

        groups
    }
}

impl<'a> HarvestStage<'a> for UpgradeReducer {
    type Input = &'a [CanonicalRow];
    type Output = Vec<UpgradeGroup>;

    fn execute(&self, input: Self::Input) -> Self::Output {
        self.reduce(input)
    }

    fn stage_name(&self) -> &'static str {
        "reduce"
    }
}
