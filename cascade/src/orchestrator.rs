//! Cascade Orchestrator
//!
//! Drives the tier loop for one search request:
//!
//! ```text
//! for tier in Top → … → depth:
//!   build grounding set from previous tier's accepted nodes
//!   run the oracle under the retry policy
//!     ├─ matched                                  → accepted = oracle answer
//!     ├─ exhausted at Leaf, Subgroup non-empty    → accepted = Subgroup answer
//!     └─ exhausted anywhere else                  → Err(NoMatch)
//!   enrich descriptions (if enabled; Subgroup-answer fallback nodes are
//!     described from the Subgroup table, not the Leaf table)
//!   with_cascade ? append to result : replace result
//! ```
//!
//! All state lives in a per-request `CascadeState`; the orchestrator itself is
//! immutable and can serve concurrent requests.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::Instrument;

use crate::config::{CascadeConfig, SearchConfig};
use crate::errors::CascadeError;
use crate::grounding::{plan, GroundingSetBuilder, TierPlan, TIER_PLAN};
use crate::node::Node;
use crate::nomenclature::{Nomenclature, NomenclatureError};
use crate::oracle::ClassificationOracle;
use crate::retry::RetryOutcome;
use crate::tier::Tier;

// ── Request / Response ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    /// Free-text query, passed to the oracle unmodified at every tier.
    pub term: String,
    /// Deepest tier to reach.
    pub depth: Tier,
    /// Overrides the orchestrator's `SearchConfig` for this request.
    pub search: Option<SearchConfig>,
}

impl ClassifyRequest {
    pub fn new(term: impl Into<String>, depth: Tier) -> Self {
        Self {
            term: term.into(),
            depth,
            search: None,
        }
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = Some(search);
        self
    }
}

/// What happened at one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierTrace {
    pub tier: Tier,
    pub grounding_size: usize,
    pub attempts: u32,
    pub accepted: usize,
    /// The previous tier's nodes stood in for an empty answer.
    pub terminal_fallback: bool,
}

/// Successful search result. `nodes` is never empty.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub depth: Tier,
    /// Every traversed tier's nodes (with cascade) or the deepest tier's only.
    pub nodes: Vec<Node>,
    /// Nodes accepted at `depth`.
    pub deepest: Vec<Node>,
    pub trace: Vec<TierTrace>,
}

impl Classification {
    /// First code accepted at the requested depth.
    pub fn best_code(&self) -> Option<&str> {
        self.deepest.first().map(|n| n.code.as_str())
    }

    /// Whether the terminal fallback produced the deepest result.
    pub fn used_terminal_fallback(&self) -> bool {
        self.trace.iter().any(|t| t.terminal_fallback)
    }
}

// ── Per-request state ────────────────────────────────────────────────────────

/// Ephemeral state of one cascade run.
#[derive(Debug, Default)]
struct CascadeState {
    /// Accepted list of the last completed tier; grounds the next tier.
    previous: Vec<Node>,
    /// Accepted list of the tier being processed.
    current: Vec<Node>,
    /// Response being assembled.
    accumulated: Vec<Node>,
    /// Enriched nodes of the last completed tier.
    level_result: Vec<Node>,
    trace: Vec<TierTrace>,
}

struct TierStep {
    accepted: Vec<Node>,
    enriched: Vec<Node>,
    trace: TierTrace,
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

pub struct CascadeOrchestrator {
    nomenclature: Arc<dyn Nomenclature>,
    oracle: Arc<dyn ClassificationOracle>,
    config: CascadeConfig,
}

impl CascadeOrchestrator {
    pub fn new(
        nomenclature: Arc<dyn Nomenclature>,
        oracle: Arc<dyn ClassificationOracle>,
        config: CascadeConfig,
    ) -> Result<Self, CascadeError> {
        config.validate().map_err(CascadeError::Configuration)?;
        Ok(Self {
            nomenclature,
            oracle,
            config,
        })
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Classify `term` down to `depth` with the configured search flags.
    pub async fn classify(&self, term: &str, depth: Tier) -> Result<Classification, CascadeError> {
        self.classify_request(&ClassifyRequest::new(term, depth))
            .await
    }

    pub async fn search_sections(&self, term: &str) -> Result<Classification, CascadeError> {
        self.classify(term, Tier::Top).await
    }

    pub async fn search_chapters(&self, term: &str) -> Result<Classification, CascadeError> {
        self.classify(term, Tier::Group).await
    }

    pub async fn search_positions4(&self, term: &str) -> Result<Classification, CascadeError> {
        self.classify(term, Tier::Subgroup).await
    }

    pub async fn search_positions6(&self, term: &str) -> Result<Classification, CascadeError> {
        self.classify(term, Tier::Leaf).await
    }

    pub async fn classify_request(
        &self,
        request: &ClassifyRequest,
    ) -> Result<Classification, CascadeError> {
        if request.term.trim().is_empty() {
            return Err(CascadeError::InvalidTerm);
        }
        let search = request.search.unwrap_or(self.config.search);
        let builder = GroundingSetBuilder::new(self.nomenclature.as_ref())
            .dedup(self.config.dedup_grounding)
            .max_concurrent_lookups(self.config.max_concurrent_lookups);

        let mut state = CascadeState::default();

        for tier_plan in TIER_PLAN.iter().take(request.depth.index() + 1) {
            let span = tracing::info_span!("cascade_tier", tier = %tier_plan.tier, term = %request.term);
            let step = self
                .run_tier(tier_plan, &builder, &request.term, &state.previous, search)
                .instrument(span)
                .await?;

            state.current = step.accepted;
            if search.with_cascade {
                state.accumulated.extend(step.enriched.iter().cloned());
            } else {
                state.accumulated = step.enriched.clone();
            }
            state.level_result = step.enriched;
            state.trace.push(step.trace);
            state.previous = std::mem::take(&mut state.current);
        }

        tracing::info!(
            term = %request.term,
            depth = %request.depth,
            returned = state.accumulated.len(),
            "cascade complete"
        );
        Ok(Classification {
            depth: request.depth,
            nodes: state.accumulated,
            deepest: state.level_result,
            trace: state.trace,
        })
    }

    async fn run_tier(
        &self,
        tier_plan: &TierPlan,
        builder: &GroundingSetBuilder<'_>,
        term: &str,
        previous: &[Node],
        search: SearchConfig,
    ) -> Result<TierStep, CascadeError> {
        let tier = tier_plan.tier;
        let grounding = builder
            .build(tier, previous)
            .await
            .map_err(CascadeError::data(tier))?;
        tracing::debug!(grounding = grounding.len(), "grounding set built");

        let outcome = self
            .config
            .retry
            .run(|_| self.oracle.classify(tier, term, &grounding))
            .await
            .map_err(CascadeError::oracle(tier))?;
        let attempts = outcome.attempts();

        let (accepted, fell_back) = match outcome {
            RetryOutcome::Matched { nodes, .. } => (nodes, false),
            RetryOutcome::Exhausted { .. } if tier_plan.terminal_fallback && !previous.is_empty() => {
                tracing::info!(attempts, "no match at terminal tier, keeping previous tier's result");
                (previous.to_vec(), true)
            }
            RetryOutcome::Exhausted { attempts } => {
                tracing::info!(attempts, "no match, cascade stops");
                return Err(CascadeError::NoMatch { tier, attempts });
            }
        };

        // Fallback nodes belong to the tier above; describe them there.
        let describe_tier = if fell_back {
            tier.previous().unwrap_or(tier)
        } else {
            tier
        };
        let enriched = if search.with_description {
            self.describe_all(describe_tier, &accepted).await?
        } else {
            accepted.iter().map(|n| Node::new(n.code.clone())).collect()
        };

        let trace = TierTrace {
            tier,
            grounding_size: grounding.len(),
            attempts,
            accepted: accepted.len(),
            terminal_fallback: fell_back,
        };
        tracing::info!(
            grounding = trace.grounding_size,
            attempts,
            accepted = trace.accepted,
            fallback = fell_back,
            "tier complete"
        );
        Ok(TierStep {
            accepted,
            enriched,
            trace,
        })
    }

    async fn describe_all(&self, tier: Tier, nodes: &[Node]) -> Result<Vec<Node>, CascadeError> {
        let trim = plan(tier).trim_code_before_describe;
        let nomenclature = self.nomenclature.as_ref();
        let lookups: Vec<BoxFuture<'_, Result<Node, NomenclatureError>>> = nodes
            .iter()
            .map(|node| {
                async move {
                    let lookup = if trim { node.code.trim() } else { node.code.as_str() };
                    let description = nomenclature.describe(tier, lookup).await?;
                    Ok::<_, NomenclatureError>(Node::described(node.code.clone(), description))
                }
                .boxed()
            })
            .collect();
        stream::iter(lookups)
            .buffered(self.config.max_concurrent_lookups)
            .try_collect()
            .await
            .map_err(CascadeError::data(tier))
    }
}
