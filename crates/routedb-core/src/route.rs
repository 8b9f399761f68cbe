//! Route keys and the per-unit-of-work key stack

use crate::error::{RoutingError, RoutingResult};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Name of a logical data source, such as `"master"` or `"slave1"`
///
/// # Examples
///
/// ```
/// use routedb_core::RouteKey;
///
/// let key = RouteKey::from("slave1");
/// assert_eq!(key.as_str(), "slave1");
/// assert_eq!(key.to_string(), "slave1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteKey(String);

impl RouteKey {
	pub fn new(key: impl Into<String>) -> Self {
		Self(key.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RouteKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for RouteKey {
	fn from(key: &str) -> Self {
		Self(key.to_string())
	}
}

impl From<String> for RouteKey {
	fn from(key: String) -> Self {
		Self(key)
	}
}

impl From<&RouteKey> for RouteKey {
	fn from(key: &RouteKey) -> Self {
		key.clone()
	}
}

impl Borrow<str> for RouteKey {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl AsRef<str> for RouteKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// Stack of route keys selected by the enclosing scopes of one unit of work
///
/// The top entry, if any, picks the data source for the next connection
/// acquisition. An empty stack means "use the default key". Every push is
/// paired with exactly one pop by the scope that made it.
///
/// # Examples
///
/// ```
/// use routedb_core::{RouteKey, RouteKeyContext};
///
/// let mut ctx = RouteKeyContext::new();
/// assert!(ctx.current().is_none());
///
/// ctx.push("slave2");
/// assert_eq!(ctx.current().map(RouteKey::as_str), Some("slave2"));
///
/// ctx.pop().unwrap();
/// assert!(ctx.current().is_none());
/// assert!(ctx.pop().is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteKeyContext {
	stack: Vec<RouteKey>,
}

impl RouteKeyContext {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, key: impl Into<RouteKey>) {
		let key = key.into();
		tracing::trace!(route_key = %key, depth = self.stack.len() + 1, "Route key pushed");
		self.stack.push(key);
	}

	/// The key selected by the innermost scope
	pub fn current(&self) -> Option<&RouteKey> {
		self.stack.last()
	}

	/// Remove the innermost key
	///
	/// Popping an empty stack is a pairing bug in the caller; the stack is
	/// left untouched and [`RoutingError::RouteStackUnderflow`] is returned.
	pub fn pop(&mut self) -> RoutingResult<RouteKey> {
		let key = self.stack.pop().ok_or(RoutingError::RouteStackUnderflow)?;
		tracing::trace!(route_key = %key, depth = self.stack.len(), "Route key popped");
		Ok(key)
	}

	pub fn depth(&self) -> usize {
		self.stack.len()
	}

	pub fn is_empty(&self) -> bool {
		self.stack.is_empty()
	}

	/// Keys from the outermost scope to the innermost
	pub fn iter(&self) -> impl Iterator<Item = &RouteKey> {
		self.stack.iter()
	}

	/// Take out the entry at `index` if it is `expected`, shifting the keys
	/// above it down by one
	pub(crate) fn remove_at(&mut self, index: usize, expected: &RouteKey) -> Option<RouteKey> {
		if self.stack.get(index) != Some(expected) {
			return None;
		}
		let key = self.stack.remove(index);
		tracing::trace!(route_key = %key, index, "Route key taken out of the stack");
		Some(key)
	}

	/// Put `key` back at `index`, or on top when the stack has shrunk below it
	pub(crate) fn insert_at(&mut self, index: usize, key: RouteKey) {
		let index = index.min(self.stack.len());
		tracing::trace!(route_key = %key, index, "Route key put back into the stack");
		self.stack.insert(index, key);
	}

	/// Cut the stack back to `depth`, returning the removed keys outermost
	/// first
	pub(crate) fn truncate(&mut self, depth: usize) -> Vec<RouteKey> {
		if depth >= self.stack.len() {
			return Vec::new();
		}
		self.stack.split_off(depth)
	}
}
