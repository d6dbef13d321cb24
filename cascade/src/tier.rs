//! Tiers of the nomenclature hierarchy.
//!
//! ```text
//! Tier      | Endpoint    | Oracle label | Harmonized System level
//! ----------|-------------|--------------|------------------------
//! Top       | sections    | SECTIONS     | Section (I … XXI)
//! Group     | chapters    | CHAPTERS     | Chapter (2 digits)
//! Subgroup  | positions4  | HEADINGS     | Heading (4 digits)
//! Leaf      | positions6  | SUBHEADINGS  | Subheading (6 digits)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One level of the four-level classification hierarchy.
///
/// Ordering follows the cascade: `Top < Group < Subgroup < Leaf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Top,
    Group,
    Subgroup,
    Leaf,
}

impl Tier {
    /// All tiers in cascade order.
    pub const ALL: [Tier; 4] = [Tier::Top, Tier::Group, Tier::Subgroup, Tier::Leaf];

    /// Zero-based position in the cascade.
    pub fn index(self) -> usize {
        match self {
            Self::Top => 0,
            Self::Group => 1,
            Self::Subgroup => 2,
            Self::Leaf => 3,
        }
    }

    /// The tier below this one, if any.
    pub fn next(self) -> Option<Tier> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// The tier above this one, if any.
    pub fn previous(self) -> Option<Tier> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Whether this is the deepest tier.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Leaf)
    }

    /// Label handed to the oracle to select the tier vocabulary.
    pub fn label(self) -> &'static str {
        match self {
            Self::Top => "SECTIONS",
            Self::Group => "CHAPTERS",
            Self::Subgroup => "HEADINGS",
            Self::Leaf => "SUBHEADINGS",
        }
    }

    /// Name of the per-tier search entry point.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Top => "sections",
            Self::Group => "chapters",
            Self::Subgroup => "positions4",
            Self::Leaf => "positions6",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => write!(f, "top"),
            Self::Group => write!(f, "group"),
            Self::Subgroup => write!(f, "subgroup"),
            Self::Leaf => write!(f, "leaf"),
        }
    }
}

/// Error returned when a string names no known tier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier '{0}' (expected one of: sections, chapters, positions4, positions6)")]
pub struct ParseTierError(pub String);

impl FromStr for Tier {
    type Err = ParseTierError;

    /// Accepts the endpoint name (`positions4`) or the tier name (`subgroup`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.endpoint() == lowered || t.to_string() == lowered)
            .ok_or_else(|| ParseTierError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_walk_in_cascade_order() {
        assert_eq!(Tier::Top.next(), Some(Tier::Group));
        assert_eq!(Tier::Subgroup.next(), Some(Tier::Leaf));
        assert_eq!(Tier::Leaf.next(), None);
        assert_eq!(Tier::Top.previous(), None);
        assert_eq!(Tier::Leaf.previous(), Some(Tier::Subgroup));
        assert!(Tier::Top < Tier::Leaf);
    }

    #[test]
    fn only_leaf_is_terminal() {
        let terminal: Vec<_> = Tier::ALL.into_iter().filter(|t| t.is_terminal()).collect();
        assert_eq!(terminal, vec![Tier::Leaf]);
    }

    #[test]
    fn parses_endpoint_and_tier_names() {
        assert_eq!("positions4".parse::<Tier>().unwrap(), Tier::Subgroup);
        assert_eq!("Chapters".parse::<Tier>().unwrap(), Tier::Group);
        assert_eq!(" leaf ".parse::<Tier>().unwrap(), Tier::Leaf);
        assert!("positions8".parse::<Tier>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(serde_json::to_string(&Tier::Subgroup).unwrap(), "\"subgroup\"");
    }
}
