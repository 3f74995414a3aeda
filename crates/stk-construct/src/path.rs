//! Construct paths and logical ids
//!
//! Provides [`ConstructPath`] for hierarchical addressing of nodes in a stack.

use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};

/// Separator between path segments
pub const PATH_SEPARATOR: char = '/';

/// Path of a node from the stack root
///
/// # Examples
/// - `["ServiceStack"]` → `ServiceStack`
/// - `["ServiceStack", "Vpc", "PublicSubnet1"]` → `ServiceStack/Vpc/PublicSubnet1`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstructPath(Vec<String>);

impl ConstructPath {
    /// Path of a stack root
    #[inline]
    #[must_use]
    pub fn root(stack_name: impl Into<String>) -> Self {
        Self(vec![stack_name.into()])
    }

    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment (the node's own id)
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Append a segment, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(segment.into());
        new
    }

    /// Check if this path is a strict ancestor of another
    #[inline]
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && self.0 == other.0[..self.0.len()]
    }

    /// Stable identifier of this node in the deployment plan
    ///
    /// Segments below the stack root with non-alphanumerics stripped,
    /// followed by 8 hex chars of SHA-256 over the full path so that
    /// `A/BC` and `AB/C` never collide.
    #[must_use]
    pub fn logical_id(&self) -> String {
        let human: String = self
            .0
            .iter()
            .skip(1)
            .flat_map(|segment| segment.chars())
            .filter(char::is_ascii_alphanumeric)
            .collect();
        let digest = Sha256::digest(self.to_string().as_bytes());
        format!("{human}{}", hex::encode_upper(&digest[..4]))
    }
}

impl Display for ConstructPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{PATH_SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_segments() {
        let path = ConstructPath::root("Stack").child("Vpc").child("Subnet");
        assert_eq!(path.to_string(), "Stack/Vpc/Subnet");
        assert_eq!(path.id(), Some("Subnet"));
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn ancestry() {
        let root = ConstructPath::root("Stack");
        let child = root.child("Vpc");
        assert!(root.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&root));
        assert!(!child.is_ancestor_of(&child));
    }

    #[test]
    fn logical_id_is_stable_and_readable() {
        let path = ConstructPath::root("Stack").child("Image-Repo").child("Resource");
        let id = path.logical_id();
        assert!(id.starts_with("ImageRepoResource"));
        assert_eq!(id.len(), "ImageRepoResource".len() + 8);
        assert_eq!(id, path.logical_id());
    }

    #[test]
    fn logical_id_disambiguates_concatenation() {
        let a = ConstructPath::root("S").child("A").child("BC");
        let b = ConstructPath::root("S").child("AB").child("C");
        assert_ne!(a.logical_id(), b.logical_id());
    }
}
