//! Cascade error taxonomy.
//!
//! | Kind              | Variant             | Status | Meaning                                  |
//! |-------------------|---------------------|--------|------------------------------------------|
//! | NoMatch           | `NoMatch`           | 404    | A tier exhausted its retries, no fallback |
//! | OracleUnavailable | `OracleUnavailable` | 502    | The oracle call itself failed            |
//! | DataAccess        | `DataAccess`        | 503    | A nomenclature lookup failed             |
//! | InvalidRequest    | `InvalidTerm`, `Configuration` | 400 | Rejected before any oracle call |
//!
//! Every kind aborts the rest of the cascade. `NoMatch` is a normal negative
//! outcome; the others are hard failures. A transport maps them through
//! `FailureKind::status_code` so callers can tell them apart.

use std::fmt;

use thiserror::Error;

use crate::nomenclature::NomenclatureError;
use crate::oracle::OracleError;
use crate::tier::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NoMatch,
    OracleUnavailable,
    DataAccess,
    InvalidRequest,
}

impl FailureKind {
    /// HTTP-style status code for transports that surface the failure.
    pub fn status_code(self) -> u16 {
        match self {
            Self::NoMatch => 404,
            Self::OracleUnavailable => 502,
            Self::DataAccess => 503,
            Self::InvalidRequest => 400,
        }
    }

    /// Whether this is a hard failure rather than a negative answer.
    pub fn is_hard_failure(self) -> bool {
        !matches!(self, Self::NoMatch)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch => write!(f, "no_match"),
            Self::OracleUnavailable => write!(f, "oracle_unavailable"),
            Self::DataAccess => write!(f, "data_access"),
            Self::InvalidRequest => write!(f, "invalid_request"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("No match at tier {tier} after {attempts} attempt(s)")]
    NoMatch { tier: Tier, attempts: u32 },

    #[error("Oracle unavailable at tier {tier}: {source}")]
    OracleUnavailable {
        tier: Tier,
        #[source]
        source: OracleError,
    },

    #[error("Nomenclature lookup failed at tier {tier}: {source}")]
    DataAccess {
        tier: Tier,
        #[source]
        source: NomenclatureError,
    },

    #[error("Search term is empty")]
    InvalidTerm,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CascadeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NoMatch { .. } => FailureKind::NoMatch,
            Self::OracleUnavailable { .. } => FailureKind::OracleUnavailable,
            Self::DataAccess { .. } => FailureKind::DataAccess,
            Self::InvalidTerm | Self::Configuration(_) => FailureKind::InvalidRequest,
        }
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch { .. })
    }

    /// Tier at which the cascade stopped, when it got that far.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Self::NoMatch { tier, .. }
            | Self::OracleUnavailable { tier, .. }
            | Self::DataAccess { tier, .. } => Some(*tier),
            Self::InvalidTerm | Self::Configuration(_) => None,
        }
    }

    /// An oracle that failed reading candidate data reports a data-access
    /// failure, not an unavailable oracle.
    pub(crate) fn oracle(tier: Tier) -> impl FnOnce(OracleError) -> Self {
        move |source| match source {
            OracleError::CandidateLookup(source) => Self::DataAccess { tier, source },
            source => Self::OracleUnavailable { tier, source },
        }
    }

    pub(crate) fn data(tier: Tier) -> impl FnOnce(NomenclatureError) -> Self {
        move |source| Self::DataAccess { tier, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn no_match_is_distinct_from_hard_failures() {
        let miss = CascadeError::NoMatch {
            tier: Tier::Group,
            attempts: 2,
        };
        let down = CascadeError::OracleUnavailable {
            tier: Tier::Group,
            source: OracleError::Timeout(Duration::from_secs(30)),
        };
        assert!(miss.is_no_match());
        assert!(!miss.kind().is_hard_failure());
        assert!(down.kind().is_hard_failure());
        assert_ne!(miss.kind().status_code(), down.kind().status_code());
    }

    #[test]
    fn data_access_carries_tier() {
        let err = CascadeError::data(Tier::Leaf)(NomenclatureError::Unavailable("db down".into()));
        assert_eq!(err.kind(), FailureKind::DataAccess);
        assert_eq!(err.kind().status_code(), 503);
        assert_eq!(err.tier(), Some(Tier::Leaf));
        assert!(err.to_string().contains("leaf"));
    }

    #[test]
    fn oracle_candidate_lookup_is_data_access() {
        let err = CascadeError::oracle(Tier::Top)(OracleError::CandidateLookup(
            NomenclatureError::Unavailable("db down".into()),
        ));
        assert_eq!(err.kind(), FailureKind::DataAccess);
        assert_eq!(err.tier(), Some(Tier::Top));

        let err = CascadeError::oracle(Tier::Top)(OracleError::Transport("reset".into()));
        assert_eq!(err.kind(), FailureKind::OracleUnavailable);
    }

    #[test]
    fn invalid_term_has_no_tier() {
        assert_eq!(CascadeError::InvalidTerm.tier(), None);
        assert_eq!(CascadeError::InvalidTerm.kind().status_code(), 400);
    }
}
