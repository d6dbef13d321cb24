//! Grounding Set Builder
//!
//! Builds the candidate list offered to the oracle at each tier from the
//! previous tier's accepted nodes. Per-tier behaviour lives in one table
//! (`TIER_PLAN`) instead of four hand-written code paths:
//!
//! ```text
//! Tier     | Source              | Empty parent list   | Describe     | Empty result
//! ---------|---------------------|---------------------|--------------|------------------
//! Top      | all nodes           | n/a                 | trimmed code | no result
//! Group    | children by parent  | all Group nodes     | code         | no result
//! Subgroup | children by prefix  | (cascade stopped)   | code         | no result
//! Leaf     | children by prefix  | (cascade stopped)   | code         | Subgroup fallback
//! ```
//!
//! Candidates are fresh code-only nodes. Overlapping children of two parents
//! are kept twice unless `dedup` is switched on.

use std::collections::HashSet;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::node::Node;
use crate::nomenclature::{ChildQuery, Nomenclature, NomenclatureError};
use crate::tier::Tier;

/// Where a tier's grounding set comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundingSource {
    /// Every node of the tier.
    AllNodes,
    /// Children explicitly linked to each accepted parent.
    ChildrenByParent,
    /// Children whose code extends each accepted parent code.
    ChildrenByPrefix,
}

/// Per-tier descriptor driving the cascade loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPlan {
    pub tier: Tier,
    pub source: GroundingSource,
    /// Use every node of the tier when the previous tier accepted nothing.
    pub fallback_to_all_on_empty_parent: bool,
    /// Trim accepted codes before looking up their description.
    pub trim_code_before_describe: bool,
    /// When exhausted, reuse the previous tier's non-empty accepted list.
    pub terminal_fallback: bool,
}

pub const TIER_PLAN: [TierPlan; 4] = [
    TierPlan {
        tier: Tier::Top,
        source: GroundingSource::AllNodes,
        fallback_to_all_on_empty_parent: false,
        trim_code_before_describe: true,
        terminal_fallback: false,
    },
    TierPlan {
        tier: Tier::Group,
        source: GroundingSource::ChildrenByParent,
        fallback_to_all_on_empty_parent: true,
        trim_code_before_describe: false,
        terminal_fallback: false,
    },
    TierPlan {
        tier: Tier::Subgroup,
        source: GroundingSource::ChildrenByPrefix,
        fallback_to_all_on_empty_parent: false,
        trim_code_before_describe: false,
        terminal_fallback: false,
    },
    TierPlan {
        tier: Tier::Leaf,
        source: GroundingSource::ChildrenByPrefix,
        fallback_to_all_on_empty_parent: false,
        trim_code_before_describe: false,
        terminal_fallback: true,
    },
];

/// The descriptor for `tier`.
pub fn plan(tier: Tier) -> &'static TierPlan {
    &TIER_PLAN[tier.index()]
}

pub struct GroundingSetBuilder<'a> {
    nomenclature: &'a dyn Nomenclature,
    dedup: bool,
    max_concurrent_lookups: usize,
}

impl<'a> GroundingSetBuilder<'a> {
    pub fn new(nomenclature: &'a dyn Nomenclature) -> Self {
        Self {
            nomenclature,
            dedup: false,
            max_concurrent_lookups: 1,
        }
    }

    pub fn dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn max_concurrent_lookups(mut self, n: usize) -> Self {
        self.max_concurrent_lookups = n.max(1);
        self
    }

    /// Candidates for `tier`, given the nodes accepted at the tier above.
    pub async fn build(
        &self,
        tier: Tier,
        previous_accepted: &[Node],
    ) -> Result<Vec<Node>, NomenclatureError> {
        let plan = plan(tier);
        let nodes = match plan.source {
            GroundingSource::AllNodes => self.nomenclature.all_nodes(tier).await?,
            _ if previous_accepted.is_empty() && plan.fallback_to_all_on_empty_parent => {
                tracing::warn!(%tier, "no accepted parents, grounding on every node of the tier");
                self.nomenclature.all_nodes(tier).await?
            }
            GroundingSource::ChildrenByParent => {
                self.children(tier, previous_accepted, ChildQuery::Parent)
                    .await?
            }
            GroundingSource::ChildrenByPrefix => {
                self.children(tier, previous_accepted, ChildQuery::Prefix)
                    .await?
            }
        };

        let candidates: Vec<Node> = nodes.into_iter().map(|n| Node::new(n.code)).collect();
        Ok(if self.dedup {
            dedup_by_code(candidates)
        } else {
            candidates
        })
    }

    /// Child lookups run concurrently; results keep parent order.
    async fn children(
        &self,
        tier: Tier,
        parents: &[Node],
        query: fn(String) -> ChildQuery,
    ) -> Result<Vec<Node>, NomenclatureError> {
        let queries: Vec<ChildQuery> = parents.iter().map(|p| query(p.code.clone())).collect();
        // Collect before streaming: a borrowing closure held across `.await` is not `Send`.
        let lookups: Vec<_> = queries
            .iter()
            .map(|q| self.nomenclature.children_of(tier, q))
            .collect();
        let batches: Vec<Vec<Node>> = stream::iter(lookups)
            .buffered(self.max_concurrent_lookups)
            .try_collect()
            .await?;
        Ok(batches.into_iter().flatten().collect())
    }
}

fn dedup_by_code(nodes: Vec<Node>) -> Vec<Node> {
    let mut seen = HashSet::new();
    nodes
        .into_iter()
        .filter(|n| seen.insert(n.code.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::codes;
    use crate::nomenclature::{Entry, InMemoryNomenclature, MockNomenclature};

    fn store() -> InMemoryNomenclature {
        InMemoryNomenclature::new()
            .with(Tier::Top, Entry::new("I", "Live animals"))
            .with(Tier::Top, Entry::new("II", "Vegetable products"))
            .with(Tier::Group, Entry::new("01", "Live animals").with_parent("I"))
            .with(Tier::Group, Entry::new("02", "Meat").with_parent("I"))
            .with(Tier::Group, Entry::new("06", "Live trees").with_parent("II"))
            .with(Tier::Subgroup, Entry::new("0101", "Horses"))
            .with(Tier::Subgroup, Entry::new("0102", "Bovine animals"))
            .with(Tier::Subgroup, Entry::new("0201", "Bovine meat"))
            .with(Tier::Leaf, Entry::new("010221", "Breeding cattle"))
            .with(Tier::Leaf, Entry::new("010229", "Other cattle"))
    }

    #[test]
    fn table_is_in_cascade_order() {
        for (i, p) in TIER_PLAN.iter().enumerate() {
            assert_eq!(p.tier.index(), i);
        }
        assert!(plan(Tier::Top).trim_code_before_describe);
        assert!(plan(Tier::Group).fallback_to_all_on_empty_parent);
        assert!(plan(Tier::Leaf).terminal_fallback);
        assert_eq!(
            TIER_PLAN.iter().filter(|p| p.terminal_fallback).count(),
            1
        );
    }

    #[tokio::test]
    async fn top_grounds_on_all_nodes_without_descriptions() {
        let store = store();
        let set = GroundingSetBuilder::new(&store)
            .build(Tier::Top, &[])
            .await
            .unwrap();
        assert_eq!(codes(&set), vec!["I", "II"]);
        assert!(set.iter().all(|n| n.description.is_none()));
    }

    #[tokio::test]
    async fn group_follows_parent_links() {
        let store = store();
        let set = GroundingSetBuilder::new(&store)
            .build(Tier::Group, &[Node::described("II", "Vegetable products")])
            .await
            .unwrap();
        assert_eq!(set, vec![Node::new("06")]);
    }

    #[tokio::test]
    async fn group_falls_back_to_all_nodes_on_empty_parents() {
        let store = store();
        let set = GroundingSetBuilder::new(&store)
            .build(Tier::Group, &[])
            .await
            .unwrap();
        assert_eq!(codes(&set), vec!["01", "02", "06"]);
    }

    #[tokio::test]
    async fn deeper_tiers_have_no_empty_parent_fallback() {
        let store = store();
        let builder = GroundingSetBuilder::new(&store);
        assert!(builder.build(Tier::Subgroup, &[]).await.unwrap().is_empty());
        assert!(builder.build(Tier::Leaf, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn children_are_concatenated_in_parent_order() {
        let store = store();
        let set = GroundingSetBuilder::new(&store)
            .max_concurrent_lookups(4)
            .build(Tier::Subgroup, &[Node::new("02"), Node::new("01")])
            .await
            .unwrap();
        assert_eq!(codes(&set), vec!["0201", "0101", "0102"]);
    }

    #[tokio::test]
    async fn overlapping_parents_keep_duplicates_unless_dedup() {
        let store = store();
        let parents = [Node::new("01"), Node::new("0102")];

        let raw = GroundingSetBuilder::new(&store)
            .build(Tier::Leaf, &parents)
            .await
            .unwrap();
        assert_eq!(codes(&raw), vec!["010221", "010229", "010221", "010229"]);

        let deduped = GroundingSetBuilder::new(&store)
            .dedup(true)
            .build(Tier::Leaf, &parents)
            .await
            .unwrap();
        assert_eq!(codes(&deduped), vec!["010221", "010229"]);
    }

    #[tokio::test]
    async fn prefix_tiers_issue_prefix_queries() {
        let mut mock = MockNomenclature::new();
        mock.expect_children_of()
            .withf(|tier, q| *tier == Tier::Leaf && *q == ChildQuery::Prefix("0102".into()))
            .times(1)
            .returning(|_, _| Ok(vec![Node::described("010221", "Breeding cattle")]));

        let set = GroundingSetBuilder::new(&mock)
            .build(Tier::Leaf, &[Node::new("0102")])
            .await
            .unwrap();
        assert_eq!(set, vec![Node::new("010221")]);
    }

    #[tokio::test]
    async fn lookup_failure_propagates() {
        let mut mock = MockNomenclature::new();
        mock.expect_all_nodes()
            .returning(|_| Err(NomenclatureError::Unavailable("db down".into())));

        let err = GroundingSetBuilder::new(&mock)
            .build(Tier::Top, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, NomenclatureError::Unavailable(_)));
    }
}
