//! Hierarchical node identity — which timeline position produced a record.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One step of ancestry: the node's index among its siblings plus the
/// iteration counter distinguishing repeated passes (loops bump it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    /// Position among the parent's children (0 for the root).
    pub index: usize,
    /// How many times this node has been reset by loop re-entry.
    pub iteration: usize,
}

/// Hierarchical identity of a timeline node.
///
/// The root renders as `"0.<iteration>"`; each child appends
/// `"-<index>.<iteration>"`, e.g. `"0.0-1.0-2.1"` is the third child of the
/// second child of the root, on its second loop pass. Every [`TrialRecord`]
/// carries the producing leaf's id, so records attribute to the leaf and to
/// every ancestor via [`NodeId::is_prefix_of`].
///
/// Prefix matching is segment-wise, not textual — `"0.0-1.0"` is an ancestor
/// of `"0.0-1.0-2.0"` but not of `"0.0-11.0"`.
///
/// [`TrialRecord`]: crate::trial::TrialRecord
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(Vec<Segment>);

impl NodeId {
    /// Identity of the root node at the given iteration.
    pub fn root(iteration: usize) -> Self {
        Self(vec![Segment {
            index: 0,
            iteration,
        }])
    }

    /// Identity of a child of this node.
    pub fn child(&self, index: usize, iteration: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment { index, iteration });
        Self(segments)
    }

    /// The ancestry segments, root first.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Tree depth: 1 for the root, 2 for its children, and so on.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Whether this id names the given node or one of its ancestors.
    ///
    /// Used by the ledger to scope queries: a timeline's generated data is
    /// every record whose id this id is a prefix of.
    pub fn is_prefix_of(&self, other: &NodeId) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "-")?;
            }
            write!(f, "{}.{}", seg.index, seg.iteration)?;
        }
        Ok(())
    }
}

/// Error parsing a [`NodeId`] from its string rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNodeIdError(String);

impl fmt::Display for ParseNodeIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid node id: {}", self.0)
    }
}

impl std::error::Error for ParseNodeIdError {}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        for part in s.split('-') {
            let (index, iteration) = part
                .split_once('.')
                .ok_or_else(|| ParseNodeIdError(s.to_owned()))?;
            let index = index
                .parse()
                .map_err(|_| ParseNodeIdError(s.to_owned()))?;
            let iteration = iteration
                .parse()
                .map_err(|_| ParseNodeIdError(s.to_owned()))?;
            segments.push(Segment { index, iteration });
        }
        if segments.is_empty() {
            return Err(ParseNodeIdError(s.to_owned()));
        }
        Ok(Self(segments))
    }
}

// Serialize as the human-readable string form — the wire format records
// carry, stable regardless of the internal representation.
impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
