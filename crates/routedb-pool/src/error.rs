//! Pool errors

/// Errors surfaced by data sources and their connections
///
/// Pool exhaustion and closure keep the original `sqlx::Error` as their
/// source so callers see exactly what the pool reported.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
	#[error("Connection pool exhausted or timed out: {0}")]
	Exhausted(#[source] sqlx::Error),

	#[error("Connection pool closed: {0}")]
	Closed(#[source] sqlx::Error),

	#[error("Invalid pool configuration: {0}")]
	Config(String),

	#[error("Database error: {0}")]
	Database(#[source] sqlx::Error),

	#[error("Backend error: {0}")]
	Backend(String),

	#[error("Type error: {0}")]
	Type(String),

	#[error("Column not found: {0}")]
	ColumnNotFound(String),

	#[error("Invalid savepoint name: {0}")]
	InvalidSavepoint(String),
}

impl PoolError {
	/// Whether the pool gave up waiting for a free connection
	pub fn is_exhausted(&self) -> bool {
		matches!(self, PoolError::Exhausted(_))
	}
}

impl From<sqlx::Error> for PoolError {
	fn from(error: sqlx::Error) -> Self {
		match error {
			sqlx::Error::PoolTimedOut => PoolError::Exhausted(error),
			sqlx::Error::PoolClosed => PoolError::Closed(error),
			other => PoolError::Database(other),
		}
	}
}

pub type PoolResult<T> = Result<T, PoolError>;
