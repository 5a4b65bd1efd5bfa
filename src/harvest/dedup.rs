use crate::harvest::traits::HarvestStage;
use crate::model::{CanonicalRow, DiscoveryRecord};
use std::collections::HashSet;

/// Keeps the first discovery of every `package@version`.
///
/// Later chains to an already-retained version are dropped, so the output
/// has exactly one row per installed version of a vulnerable package, in the
/// order versions were first discovered.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deduplicator;

impl Deduplicator {
    pub fn dedup<I>(&self, discoveries: I) -> Vec<CanonicalRow>
    where
        I: IntoIterator<Item = DiscoveryRecord>,
    {
        let mut retained: HashSet<String> = HashSet::new();
        let mut rows = Vec::new();

        for discovery in discoveries {
            if retained.insert(discovery.dedup_key()) {
                rows.push(CanonicalRow::from(discovery));
            }
        }

        rows
    }
}

impl<'a> HarvestStage<'a> for Deduplicator {
    type Input = Vec<DiscoveryRecord>;
    type Output = Vec<CanonicalRow>;

    fn execute(&self, input: Self::Input) -> Self::Output {
        self.dedup(input)
    }

    fn stage_name(&self) -> &'static str {
        "dedup"
    }
}
