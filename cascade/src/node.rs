//! Classification entries.

use serde::{Deserialize, Serialize};

/// A classification entry: a prefix-encoded code and an optional description.
///
/// Nodes are plain values; two nodes with the same code name the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Node {
    /// A node carrying only its code.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: None,
        }
    }

    pub fn described(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: Some(description.into()),
        }
    }

    /// Whether a non-empty description is attached.
    pub fn has_description(&self) -> bool {
        self.description.as_deref().is_some_and(|d| !d.is_empty())
    }
}

/// Codes of a node list, in order.
#[cfg(test)]
pub(crate) fn codes(nodes: &[Node]) -> Vec<&str> {
    nodes.iter().map(|n| n.code.as_str()).collect()
}
