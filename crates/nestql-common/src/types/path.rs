//! Addresses of actions and response nodes.
//!
//! A [`Path`] locates a selection node inside the client query. The compiler
//! uses it as the identity of an action, the scheduler orders by it, and the
//! assembler nests results along it.

use serde_json::Value;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A selected field, optionally aliased.
    Field {
        /// Field name as declared by the schema.
        name: String,
        /// Client-chosen alias.
        alias: Option<String>,
    },
    /// A position inside a list value.
    Index(usize),
}

impl PathSegment {
    /// Creates an unaliased field segment.
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            alias: None,
        }
    }

    /// Creates a field segment with an optional alias.
    pub fn aliased(name: impl Into<String>, alias: Option<String>) -> Self {
        Self::Field {
            name: name.into(),
            alias,
        }
    }

    /// Returns the key under which this segment appears in a response.
    #[must_use]
    pub fn response_key(&self) -> Value {
        match self {
            Self::Field { name, alias } => Value::String(alias.clone().unwrap_or_else(|| name.clone())),
            Self::Index(index) => Value::from(*index),
        }
    }
}

impl Ord for PathSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Index(a), Self::Index(b)) => a.cmp(b),
            (Self::Index(_), Self::Field { .. }) => Ordering::Less,
            (Self::Field { .. }, Self::Index(_)) => Ordering::Greater,
            (
                Self::Field { name: a, alias: a_alias },
                Self::Field { name: b, alias: b_alias },
            ) => a.cmp(b).then_with(|| a_alias.cmp(b_alias)),
        }
    }
}

impl PartialOrd for PathSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { name, alias: None } => f.write_str(name),
            Self::Field {
                name,
                alias: Some(alias),
            } => write!(f, "{name}={alias}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Position of a node in the nested client query.
///
/// Ordering is lexicographic over segments, with index segments compared
/// numerically, so `a.2` sorts before `a.10`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(SmallVec<[PathSegment; 4]>);

impl Path {
    /// The empty path (the query root).
    #[must_use]
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    /// Builds a path of unaliased field segments.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(PathSegment::field).collect())
    }

    /// Returns a new path extended by one segment.
    #[must_use]
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// Returns the enclosing path, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        let mut segments = self.0.clone();
        segments.pop();
        Some(Self(segments))
    }

    /// Returns the last segment.
    #[must_use]
    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Returns the segments in order.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Number of field segments (nesting depth, index segments excluded).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0
            .iter()
            .filter(|segment| matches!(segment, PathSegment::Field { .. }))
            .count()
    }

    /// Returns `true` for the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `self` is a strict ancestor of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Renders the path the way GraphQL locates errors: response keys and
    /// list indices.
    #[must_use]
    pub fn to_response_path(&self) -> Vec<Value> {
        self.0.iter().map(PathSegment::response_key).collect()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromIterator<PathSegment> for Path {
    fn from_iter<T: IntoIterator<Item = PathSegment>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_display_with_alias() {
        let path = Path::root()
            .child(PathSegment::field("find_authors"))
            .child(PathSegment::aliased("books", Some("novels".to_string())));
        assert_eq!(path.to_string(), "find_authors.books=novels");
        assert_eq!(path.depth(), 2);
    }

    #[test]
    fn test_parent_and_ancestor() {
        let parent = Path::from_fields(["create_author"]);
        let child = parent.child(PathSegment::field("books"));

        assert_eq!(child.parent(), Some(parent.clone()));
        assert!(parent.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&parent));
        assert!(!parent.is_ancestor_of(&parent));
        assert_eq!(Path::root().parent(), None);
    }

    #[test]
    fn test_numeric_index_ordering() {
        let two = Path::from_fields(["a"]).child(PathSegment::Index(2));
        let ten = Path::from_fields(["a"]).child(PathSegment::Index(10));
        assert!(two < ten);
        // A plain string comparison would put "10" first.
        assert!(two.to_string() > ten.to_string());
    }

    #[test]
    fn test_response_path_uses_alias() {
        let path = Path::root()
            .child(PathSegment::aliased("find_posts", Some("latest".to_string())))
            .child(PathSegment::Index(3));
        assert_eq!(
            path.to_response_path(),
            vec![Value::from("latest"), Value::from(3)]
        );
    }

    proptest! {
        #[test]
        fn prop_ordering_is_consistent_with_prefixes(a in "[a-z]{1,6}", b in "[a-z]{1,6}") {
            let parent = Path::from_fields([a.clone()]);
            let child = parent.child(PathSegment::field(b));
            prop_assert!(parent < child);
            prop_assert!(parent.is_ancestor_of(&child));
        }
    }
}
