//! Lossless conversion between tree nodes and their plain JSON form.
//!
//! The plain form nests `collections → publications → artifacts`; every
//! artifact carries a `state` tag (`unbuilt`, `built`, `published`) so the
//! variant survives the round trip. It is also the interchange format read by
//! the site renderer.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::TreeNode;

/// Serialize a node and its descendants to pretty-printed JSON.
pub fn serialize<T: TreeNode>(node: &T) -> Result<String> {
    serde_json::to_string_pretty(node).map_err(|e| Error::serialization(e.to_string()))
}

/// Parse a node previously produced by [`serialize`].
pub fn deserialize<T: TreeNode>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| Error::serialization(e.to_string()))
}

/// The plain mapping representation of a node.
pub fn to_plain<T: TreeNode>(node: &T) -> Result<Value> {
    node.to_plain()
}

/// Rebuild a node from its plain mapping representation.
pub fn from_plain<T: TreeNode>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::serialization(e.to_string()))
}
