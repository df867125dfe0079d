//! The path index.
//!
//! Keys are `lowercase(method)` followed by the non-empty `/`-separated
//! segments of the path, so `GET /users/{id}` is stored as
//! `get → users → {id}`.

use crate::error::{RouterError, RouterResult};
use crate::node::{NodeId, PathNode, SegmentKind};
use crate::params::PathParams;
use crate::security::SecurityRequirements;
use crate::MatchResult;

/// Prefix tree over method + path segments carrying security metadata.
///
/// The index is built once, then only read. It holds no interior
/// mutability, so a shared `&PathIndex` (or `Arc<PathIndex>`) can be matched
/// from any number of threads at once.
///
/// # Example
///
/// ```rust
/// use portcullis_router::{PathIndex, SecurityBinding, SecurityRequirements};
///
/// let mut index = PathIndex::new();
/// index
///     .insert(
///         "GET",
///         "/providers/{providerId}",
///         SecurityRequirements::new()
///             .with_binding("providerId", SecurityBinding::path("provider", "view").unwrap()),
///     )
///     .unwrap();
///
/// let found = index.find("GET", "/providers/AAR").unwrap();
/// assert_eq!(found.params().get("providerId"), Some("AAR"));
/// assert_eq!(found.node().parameter_bindings().len(), 1);
///
/// assert!(index.find("DELETE", "/providers/AAR").is_none());
/// ```
///
/// # Matching precedence
///
/// At every depth an exact literal child is taken before the parameter
/// child. The walk never backtracks: once a literal has been chosen, a
/// failure further down is a miss even if the parameter branch would have
/// matched.
#[derive(Debug, Clone)]
pub struct PathIndex {
    nodes: Vec<PathNode>,
    route_count: usize,
}

impl Default for PathIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PathIndex {
    /// Creates an index containing only the root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![PathNode::root()],
            route_count: 0,
        }
    }

    /// Inserts (or extends) the entry for `method` + `path`.
    ///
    /// Intermediate nodes are created as needed. If the entry already
    /// exists its requirements are merged: roles are unioned and bindings
    /// overwrite by name.
    ///
    /// # Errors
    ///
    /// - [`RouterError::EmptyMethod`] for an empty method.
    /// - [`RouterError::EmptyParameter`] for a `{}` segment.
    /// - [`RouterError::AmbiguousParameter`] when a parameter segment would
    ///   become a second, differently named parameter child of one node.
    ///
    /// On error the index may contain intermediate nodes created before the
    /// conflicting segment. Callers that need all-or-nothing semantics run
    /// [`PathIndex::check_insert`] over every entry first.
    pub fn insert(
        &mut self,
        method: &str,
        path: &str,
        requirements: SecurityRequirements,
    ) -> RouterResult<NodeId> {
        let method = method.trim().to_ascii_lowercase();
        if method.is_empty() {
            return Err(RouterError::EmptyMethod);
        }

        let mut current = self.literal_child_or_insert(NodeId::ROOT, &method);

        for segment in split_path(path) {
            current = match SegmentKind::parse(segment) {
                SegmentKind::Literal => self.literal_child_or_insert(current, segment),
                SegmentKind::Parameter(name) => {
                    if name.is_empty() {
                        return Err(RouterError::EmptyParameter {
                            path: display_key(&method, path),
                        });
                    }
                    self.param_child_or_insert(current, segment, name, &method, path)?
                }
            };
        }

        self.nodes[current.0].requirements.merge(requirements);
        self.route_count += 1;
        Ok(current)
    }

    /// Reports the error [`PathIndex::insert`] would return for `method` +
    /// `path`, without modifying the index.
    ///
    /// # Errors
    ///
    /// The same errors as [`PathIndex::insert`].
    pub fn check_insert(&self, method: &str, path: &str) -> RouterResult<()> {
        let method = method.trim().to_ascii_lowercase();
        if method.is_empty() {
            return Err(RouterError::EmptyMethod);
        }

        let mut current = self.nodes[NodeId::ROOT.0].literal_child(&method);
        for segment in split_path(path) {
            let kind = SegmentKind::parse(segment);
            if let SegmentKind::Parameter(name) = &kind {
                if name.is_empty() {
                    return Err(RouterError::EmptyParameter {
                        path: display_key(&method, path),
                    });
                }
            }
            // below a node that does not exist yet everything is new
            let Some(parent) = current else {
                continue;
            };
            let node = &self.nodes[parent.0];
            current = match kind {
                SegmentKind::Literal => node.literal_child(segment),
                SegmentKind::Parameter(name) => match node.param_child() {
                    Some(existing) => {
                        let existing_name =
                            self.nodes[existing.0].parameter_name().unwrap_or_default();
                        if existing_name != name {
                            return Err(RouterError::AmbiguousParameter {
                                path: display_key(&method, path),
                                existing: existing_name.to_string(),
                                conflicting: name,
                            });
                        }
                        Some(existing)
                    }
                    None => None,
                },
            };
        }
        Ok(())
    }

    /// Finds the entry for `method` + `path`, capturing parameter segments.
    ///
    /// Returns `None` when no entry matches. A match on a node without any
    /// security metadata is still a match; it simply requires nothing.
    #[must_use]
    pub fn find(&self, method: &str, path: &str) -> Option<MatchResult<'_>> {
        let method = method.to_ascii_lowercase();
        let mut params = PathParams::new();
        let mut current = NodeId::ROOT;

        for segment in std::iter::once(method.as_str()).chain(split_path(path)) {
            let node = &self.nodes[current.0];
            if let Some(next) = node.literal_child(segment) {
                current = next;
                continue;
            }
            let next = node.param_child()?;
            if let Some(name) = self.nodes[next.0].parameter_name() {
                params.bind(name, segment);
            }
            current = next;
        }

        Some(MatchResult::new(current, &self.nodes[current.0], params))
    }

    /// Returns the node stored at `id`.
    ///
    /// Ids are only meaningful for the index that produced them.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&PathNode> {
        self.nodes.get(id.0)
    }

    /// Returns the root node.
    #[must_use]
    pub fn root(&self) -> &PathNode {
        &self.nodes[NodeId::ROOT.0]
    }

    /// Number of `insert` calls that succeeded.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.route_count
    }

    /// Number of nodes, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes that carry roles or bindings.
    #[must_use]
    pub fn secured_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !n.requirements.is_empty())
            .count()
    }

    /// Returns true if nothing has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }

    fn push(&mut self, node: PathNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn literal_child_or_insert(&mut self, parent: NodeId, segment: &str) -> NodeId {
        if let Some(existing) = self.nodes[parent.0].literal_child(segment) {
            return existing;
        }
        let id = self.push(PathNode::new(segment, SegmentKind::Literal));
        self.nodes[parent.0]
            .literal_children
            .insert(segment.to_string(), id);
        id
    }

    fn param_child_or_insert(
        &mut self,
        parent: NodeId,
        segment: &str,
        name: String,
        method: &str,
        path: &str,
    ) -> RouterResult<NodeId> {
        if let Some(existing) = self.nodes[parent.0].param_child() {
            let existing_name = self.nodes[existing.0].parameter_name().unwrap_or_default();
            if existing_name == name {
                return Ok(existing);
            }
            return Err(RouterError::AmbiguousParameter {
                path: display_key(method, path),
                existing: existing_name.to_string(),
                conflicting: name,
            });
        }
        let id = self.push(PathNode::new(segment, SegmentKind::Parameter(name)));
        self.nodes[parent.0].param_child = Some(id);
        Ok(id)
    }
}

/// Splits a path into its non-empty segments.
///
/// Leading, trailing and doubled slashes do not produce segments.
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn display_key(method: &str, path: &str) -> String {
    format!("{method} {path}")
}
