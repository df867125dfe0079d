//! Index node representation.
//!
//! Nodes live in an arena owned by [`PathIndex`](crate::PathIndex) and refer
//! to their children by [`NodeId`]. Parents own children; there are no back
//! references.

use indexmap::{IndexMap, IndexSet};

use crate::security::{SecurityBinding, SecurityRequirements};

/// Position of a node inside its index arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The root node of every index.
    pub const ROOT: NodeId = NodeId(0);

    /// Returns the raw arena position.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// What a node's segment matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Exactly this text (method names and fixed path segments).
    Literal,
    /// Any single segment, bound under the given name.
    Parameter(String),
}

impl SegmentKind {
    /// Classifies a template segment.
    ///
    /// Only whole-segment placeholders (`{name}`) are parameters; partial
    /// templates such as `file.{ext}` are matched literally.
    #[must_use]
    pub fn parse(segment: &str) -> Self {
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => SegmentKind::Parameter(name.to_string()),
            None => SegmentKind::Literal,
        }
    }
}

/// A node of the path index.
#[derive(Debug, Clone)]
pub struct PathNode {
    pub(crate) segment: String,
    pub(crate) kind: SegmentKind,
    pub(crate) literal_children: IndexMap<String, NodeId>,
    pub(crate) param_child: Option<NodeId>,
    pub(crate) requirements: SecurityRequirements,
}

impl PathNode {
    pub(crate) fn new(segment: impl Into<String>, kind: SegmentKind) -> Self {
        Self {
            segment: segment.into(),
            kind,
            literal_children: IndexMap::new(),
            param_child: None,
            requirements: SecurityRequirements::new(),
        }
    }

    pub(crate) fn root() -> Self {
        Self::new("", SegmentKind::Literal)
    }

    /// The segment text as written in the template (`{id}` for parameters).
    #[must_use]
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// The segment kind.
    #[must_use]
    pub fn kind(&self) -> &SegmentKind {
        &self.kind
    }

    /// Returns true if this node matches any segment.
    #[must_use]
    pub fn is_parameter(&self) -> bool {
        matches!(self.kind, SegmentKind::Parameter(_))
    }

    /// The delimiter-stripped parameter name, for parameter nodes.
    #[must_use]
    pub fn parameter_name(&self) -> Option<&str> {
        match &self.kind {
            SegmentKind::Parameter(name) => Some(name),
            SegmentKind::Literal => None,
        }
    }

    /// Security metadata attached to this node.
    #[must_use]
    pub fn requirements(&self) -> &SecurityRequirements {
        &self.requirements
    }

    /// Roles of which the caller must hold at least one.
    #[must_use]
    pub fn required_roles(&self) -> &IndexSet<String> {
        self.requirements.roles()
    }

    /// Parameter bindings in declaration order.
    #[must_use]
    pub fn parameter_bindings(&self) -> &IndexMap<String, SecurityBinding> {
        self.requirements.bindings()
    }

    /// Child matching `segment` exactly.
    #[must_use]
    pub fn literal_child(&self, segment: &str) -> Option<NodeId> {
        self.literal_children.get(segment).copied()
    }

    /// The single parameter child, if any.
    #[must_use]
    pub fn param_child(&self) -> Option<NodeId> {
        self.param_child
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        assert_eq!(SegmentKind::parse("users"), SegmentKind::Literal);
        assert_eq!(SegmentKind::parse("file.{ext}"), SegmentKind::Literal);
        assert_eq!(SegmentKind::parse("{open"), SegmentKind::Literal);
    }

    #[test]
    fn test_parse_parameter() {
        assert_eq!(
            SegmentKind::parse("{providerId}"),
            SegmentKind::Parameter("providerId".to_string())
        );
    }

    #[test]
    fn test_parameter_node_accessors() {
        let node = PathNode::new("{userId}", SegmentKind::parse("{userId}"));
        assert!(node.is_parameter());
        assert_eq!(node.parameter_name(), Some("userId"));
        assert_eq!(node.segment(), "{userId}");
        assert!(node.requirements().is_empty());
    }

    #[test]
    fn test_root_is_literal() {
        let root = PathNode::root();
        assert!(!root.is_parameter());
        assert_eq!(root.parameter_name(), None);
    }
}
