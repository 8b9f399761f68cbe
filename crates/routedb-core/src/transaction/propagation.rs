//! Transaction propagation modes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a transaction boundary relates to the transaction already active in
/// its unit of work
///
/// Names parse and serialize in `SCREAMING_SNAKE_CASE`:
///
/// ```
/// use routedb_core::Propagation;
///
/// let mode: Propagation = "REQUIRES_NEW".parse().unwrap();
/// assert_eq!(mode, Propagation::RequiresNew);
/// assert_eq!(Propagation::NotSupported.to_string(), "NOT_SUPPORTED");
/// assert!("SOMETIMES".parse::<Propagation>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
	/// Join the active transaction or start one
	#[default]
	Required,
	/// Park the active transaction and always start a new one
	RequiresNew,
	/// Join the active transaction or run without one
	Supports,
	/// Park the active transaction and run without one
	NotSupported,
	/// Join the active transaction; fail without one
	Mandatory,
	/// Run without a transaction; fail inside one
	Never,
	/// Open a savepoint in the active transaction or start one
	Nested,
}

impl Propagation {
	pub const ALL: [Propagation; 7] = [
		Propagation::Required,
		Propagation::RequiresNew,
		Propagation::Supports,
		Propagation::NotSupported,
		Propagation::Mandatory,
		Propagation::Never,
		Propagation::Nested,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Propagation::Required => "REQUIRED",
			Propagation::RequiresNew => "REQUIRES_NEW",
			Propagation::Supports => "SUPPORTS",
			Propagation::NotSupported => "NOT_SUPPORTED",
			Propagation::Mandatory => "MANDATORY",
			Propagation::Never => "NEVER",
			Propagation::Nested => "NESTED",
		}
	}

	/// Whether this mode parks an active transaction on entry
	pub fn suspends(&self) -> bool {
		matches!(self, Propagation::RequiresNew | Propagation::NotSupported)
	}
}

impl fmt::Display for Propagation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown propagation mode: {0}")]
pub struct ParsePropagationError(String);

impl FromStr for Propagation {
	type Err = ParsePropagationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let normalized = s.trim().to_ascii_uppercase();
		Self::ALL
			.into_iter()
			.find(|mode| mode.as_str() == normalized)
			.ok_or_else(|| ParsePropagationError(s.to_string()))
	}
}
