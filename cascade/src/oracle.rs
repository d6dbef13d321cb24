//! Classification oracle contract.
//!
//! The oracle is a black box that, given a tier, a search term and a bounded
//! grounding set, returns the nodes it judges relevant. It is unreliable by
//! nature: an empty answer is a normal outcome and drives the retry logic,
//! while an `Err` is a hard failure that ends the cascade.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::node::Node;
use crate::nomenclature::NomenclatureError;
use crate::tier::Tier;

/// Hard failures of an oracle call. None of these are retried.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle transport failure: {0}")]
    Transport(String),

    #[error("Oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("Oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Oracle misconfigured: {0}")]
    Configuration(String),

    /// The oracle could not read candidate data from the nomenclature.
    /// Reported by the cascade as a data-access failure.
    #[error("Candidate lookup failed: {0}")]
    CandidateLookup(#[from] NomenclatureError),
}

/// Selects the relevant nodes of a grounding set for a search term.
///
/// Returned nodes carry a code; they are not guaranteed to be members of
/// `candidates`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    async fn classify(
        &self,
        tier: Tier,
        term: &str,
        candidates: &[Node],
    ) -> Result<Vec<Node>, OracleError>;
}
