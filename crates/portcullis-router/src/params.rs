//! Captured path parameters.
//!
//! Values bound while walking the index are kept in a small vector: most
//! API paths carry between one and three templated segments, so the common
//! case never touches the heap.

use smallvec::SmallVec;

/// Number of captures stored inline before spilling to the heap.
const INLINE_CAPTURES: usize = 4;

/// Path parameters captured during a match, in path order.
///
/// # Example
///
/// ```rust
/// use portcullis_router::PathParams;
///
/// let mut params = PathParams::new();
/// params.bind("providerCode", "AAR");
/// params.bind("accountCode", "123");
///
/// assert_eq!(params.get("providerCode"), Some("AAR"));
/// assert_eq!(params.get("accountCode"), Some("123"));
/// assert_eq!(params.get("programId"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathParams {
    captures: SmallVec<[(String, String); INLINE_CAPTURES]>,
}

impl PathParams {
    /// Creates an empty capture set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to the literal request segment `value`.
    ///
    /// A template never repeats a parameter name on one path, but if a
    /// caller binds the same name twice the latest value wins on lookup.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.captures.push((name.into(), value.into()));
    }

    /// Returns the value captured for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.captures
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if `name` was captured.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    /// Returns the number of captures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.captures.len()
    }

    /// Iterates over `(name, value)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.captures.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            captures: iter.into_iter().collect(),
        }
    }
}
