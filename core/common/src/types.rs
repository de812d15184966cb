//! Common types used throughout Sable.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Unique identifier for a network share.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShareId(String);

impl ShareId {
    /// Create a new ShareId from a string.
    ///
    /// # Preconditions
    /// - `id` must be non-empty
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "ShareId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical storage path, independent of the backing medium.
///
/// This type names a bucket or folder in whatever back end a persistent
/// store maps it to. It is not a physical filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorePath {
    components: Vec<String>,
}

impl StorePath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create a path from string components.
    ///
    /// # Preconditions
    /// - Components must not contain path separators
    /// - Components must not be empty strings
    ///
    /// # Errors
    /// - Returns error if any component is invalid
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        for comp in &components {
            if comp.is_empty() {
                return Err(crate::Error::InvalidInput(
                    "Path component cannot be empty".to_string(),
                ));
            }
            if comp.contains('/') || comp.contains('\\') {
                return Err(crate::Error::InvalidInput(
                    "Path component cannot contain separators".to_string(),
                ));
            }
        }
        Ok(Self { components })
    }

    /// Parse a path string into StorePath.
    ///
    /// Uses '/' as separator.
    pub fn parse(path: &str) -> crate::Result<Self> {
        if path.is_empty() || path == "/" {
            return Ok(Self::root());
        }

        let path = path.trim_start_matches('/').trim_end_matches('/');
        if path.is_empty() {
            return Ok(Self::root());
        }

        let components: Vec<String> = path.split('/').map(String::from).collect();
        Self::from_components(components)
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join this path with a child component.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        if child.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Child component cannot be empty".to_string(),
            ));
        }
        if child.contains('/') || child.contains('\\') {
            return Err(crate::Error::InvalidInput(
                "Child component cannot contain separators".to_string(),
            ));
        }
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Convert to a string representation.
    pub fn to_string_path(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else {
            format!("/{}", self.components.join("/"))
        }
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

/// Opaque unlock secret, zeroized on drop.
///
/// Supplied at unlock or provisioning time only; never persisted or logged
/// by the application.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Credential(Vec<u8>);

impl Credential {
    /// Create a credential from raw bytes.
    pub fn new(secret: Vec<u8>) -> Self {
        Self(secret)
    }

    /// Create a credential from a string secret.
    pub fn from_str(secret: &str) -> Self {
        Self(secret.as_bytes().to_vec())
    }

    /// Get a reference to the secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([REDACTED; {} bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_share_id_creation() {
        let id = ShareId::new("test-share").unwrap();
        assert_eq!(id.as_str(), "test-share");
    }

    #[test]
    fn test_share_id_empty_fails() {
        assert!(ShareId::new("").is_err());
    }

    #[test]
    fn test_store_path_root() {
        let path = StorePath::root();
        assert!(path.is_root());
        assert_eq!(path.to_string_path(), "/");
    }

    #[test]
    fn test_store_path_parse() {
        let path = StorePath::parse("/foo/bar/baz").unwrap();
        assert_eq!(path.components(), &["foo", "bar", "baz"]);
        assert_eq!(path.to_string_path(), "/foo/bar/baz");
    }

    #[test]
    fn test_store_path_join() {
        let path = StorePath::root().join("foo").unwrap().join("bar").unwrap();
        assert_eq!(path.to_string_path(), "/foo/bar");
    }

    #[test]
    fn test_store_path_parent() {
        let path = StorePath::parse("/foo/bar").unwrap();
        let parent = path.parent().unwrap();
        assert_eq!(parent.to_string_path(), "/foo");
    }

    #[test]
    fn test_store_path_join_rejects_separators() {
        assert!(StorePath::root().join("a/b").is_err());
        assert!(StorePath::root().join("").is_err());
    }

    #[test]
    fn test_credential_debug_redacted() {
        let cred = Credential::from_str("mysecret");
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("mysecret"));
        assert!(debug.contains("REDACTED"));
    }

    proptest! {
        #[test]
        fn prop_store_path_roundtrip(components in prop::collection::vec("[a-zA-Z0-9._-]{1,12}", 0..6)) {
            let path = StorePath::from_components(components.clone()).unwrap();
            let reparsed = StorePath::parse(&path.to_string_path()).unwrap();
            prop_assert_eq!(path, reparsed);
        }
    }
}
