//! Common type definitions for the connection seam

use super::error::{PoolError, PoolResult};
use std::collections::HashMap;

/// Database type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
	Postgres,
	Sqlite,
	Mysql,
}

impl DatabaseType {
	/// Infer the database type from a connection URL scheme
	///
	/// # Examples
	///
	/// ```
	/// use routedb_pool::DatabaseType;
	///
	/// assert_eq!(DatabaseType::from_url("postgresql://db/app"), Some(DatabaseType::Postgres));
	/// assert_eq!(DatabaseType::from_url("sqlite::memory:"), Some(DatabaseType::Sqlite));
	/// assert_eq!(DatabaseType::from_url("mariadb://db/app"), Some(DatabaseType::Mysql));
	/// assert_eq!(DatabaseType::from_url("mongodb://db"), None);
	/// ```
	pub fn from_url(url: &str) -> Option<Self> {
		let scheme = url.split(':').next()?.to_ascii_lowercase();
		match scheme.as_str() {
			"postgres" | "postgresql" => Some(DatabaseType::Postgres),
			"mysql" | "mariadb" => Some(DatabaseType::Mysql),
			"sqlite" => Some(DatabaseType::Sqlite),
			_ => None,
		}
	}

	/// Whether the dialect supports `SAVEPOINT` inside a transaction
	///
	/// All three dialects do; a deployment that cannot (MySQL on MyISAM
	/// tables, for instance) opts out per data source through the
	/// `savepoints` setting.
	pub fn supports_savepoints(&self) -> bool {
		true
	}

	/// Quote an identifier for this dialect
	pub fn quote_identifier(&self, name: &str) -> String {
		match self {
			DatabaseType::Mysql => format!("`{}`", name.replace('`', "``")),
			DatabaseType::Postgres | DatabaseType::Sqlite => {
				format!("\"{}\"", name.replace('"', "\"\""))
			}
		}
	}

	/// Statement opening a transaction, optionally at a given isolation level
	///
	/// # Examples
	///
	/// ```
	/// use routedb_pool::{DatabaseType, IsolationLevel};
	///
	/// assert_eq!(DatabaseType::Postgres.begin_sql(None), "BEGIN");
	/// assert_eq!(DatabaseType::Mysql.begin_sql(None), "START TRANSACTION");
	/// assert_eq!(
	///     DatabaseType::Postgres.begin_sql(Some(IsolationLevel::Serializable)),
	///     "BEGIN ISOLATION LEVEL SERIALIZABLE"
	/// );
	/// ```
	pub fn begin_sql(&self, isolation: Option<IsolationLevel>) -> String {
		match isolation {
			Some(level) => level.begin_transaction_sql(*self),
			None => match self {
				DatabaseType::Mysql => "START TRANSACTION".to_string(),
				DatabaseType::Postgres | DatabaseType::Sqlite => "BEGIN".to_string(),
			},
		}
	}

	pub fn commit_sql(&self) -> &'static str {
		"COMMIT"
	}

	pub fn rollback_sql(&self) -> &'static str {
		"ROLLBACK"
	}
}

/// Query parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	Bytes(Vec<u8>),
}

impl From<&str> for QueryValue {
	fn from(s: &str) -> Self {
		QueryValue::String(s.to_string())
	}
}

impl From<String> for QueryValue {
	fn from(s: String) -> Self {
		QueryValue::String(s)
	}
}

impl From<i64> for QueryValue {
	fn from(i: i64) -> Self {
		QueryValue::Int(i)
	}
}

impl From<i32> for QueryValue {
	fn from(i: i32) -> Self {
		QueryValue::Int(i as i64)
	}
}

impl From<f64> for QueryValue {
	fn from(f: f64) -> Self {
		QueryValue::Float(f)
	}
}

impl From<bool> for QueryValue {
	fn from(b: bool) -> Self {
		QueryValue::Bool(b)
	}
}

impl From<Vec<u8>> for QueryValue {
	fn from(bytes: Vec<u8>) -> Self {
		QueryValue::Bytes(bytes)
	}
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
	fn from(value: Option<T>) -> Self {
		value.map_or(QueryValue::Null, Into::into)
	}
}

/// Row from query result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
	pub data: HashMap<String, QueryValue>,
}

impl Row {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, key: impl Into<String>, value: QueryValue) {
		self.data.insert(key.into(), value);
	}

	/// Typed column access
	///
	/// # Examples
	///
	/// ```
	/// use routedb_pool::{QueryValue, Row};
	///
	/// let mut row = Row::new();
	/// row.insert("id", QueryValue::Int(7));
	/// row.insert("username", QueryValue::from("alice"));
	///
	/// assert_eq!(row.get::<i64>("id").unwrap(), 7);
	/// assert_eq!(row.get::<String>("username").unwrap(), "alice");
	/// assert!(row.get::<i64>("missing").is_err());
	/// ```
	pub fn get<T>(&self, key: &str) -> PoolResult<T>
	where
		T: TryFrom<QueryValue, Error = PoolError>,
	{
		self.data
			.get(key)
			.cloned()
			.ok_or_else(|| PoolError::ColumnNotFound(key.to_string()))
			.and_then(T::try_from)
	}

	/// Typed access to a nullable column; `NULL` becomes `None`
	pub fn get_optional<T>(&self, key: &str) -> PoolResult<Option<T>>
	where
		T: TryFrom<QueryValue, Error = PoolError>,
	{
		match self.data.get(key) {
			None => Err(PoolError::ColumnNotFound(key.to_string())),
			Some(QueryValue::Null) => Ok(None),
			Some(value) => T::try_from(value.clone()).map(Some),
		}
	}
}

impl TryFrom<QueryValue> for i64 {
	type Error = PoolError;

	fn try_from(value: QueryValue) -> Result<Self, Self::Error> {
		match value {
			QueryValue::Int(i) => Ok(i),
			_ => Err(PoolError::Type(format!("Cannot convert {:?} to i64", value))),
		}
	}
}

impl TryFrom<QueryValue> for i32 {
	type Error = PoolError;

	fn try_from(value: QueryValue) -> Result<Self, Self::Error> {
		match value {
			QueryValue::Int(i) => i32::try_from(i)
				.map_err(|_| PoolError::Type(format!("Value {} out of range for i32", i))),
			_ => Err(PoolError::Type(format!("Cannot convert {:?} to i32", value))),
		}
	}
}

impl TryFrom<QueryValue> for f64 {
	type Error = PoolError;

	fn try_from(value: QueryValue) -> Result<Self, Self::Error> {
		match value {
			QueryValue::Float(f) => Ok(f),
			QueryValue::Int(i) => Ok(i as f64),
			_ => Err(PoolError::Type(format!("Cannot convert {:?} to f64", value))),
		}
	}
}

impl TryFrom<QueryValue> for bool {
	type Error = PoolError;

	fn try_from(value: QueryValue) -> Result<Self, Self::Error> {
		match value {
			QueryValue::Bool(b) => Ok(b),
			// SQLite stores booleans as integers
			QueryValue::Int(0) => Ok(false),
			QueryValue::Int(1) => Ok(true),
			_ => Err(PoolError::Type(format!("Cannot convert {:?} to bool", value))),
		}
	}
}

impl TryFrom<QueryValue> for String {
	type Error = PoolError;

	fn try_from(value: QueryValue) -> Result<Self, Self::Error> {
		match value {
			QueryValue::String(s) => Ok(s),
			_ => Err(PoolError::Type(format!("Cannot convert {:?} to String", value))),
		}
	}
}

impl TryFrom<QueryValue> for Vec<u8> {
	type Error = PoolError;

	fn try_from(value: QueryValue) -> Result<Self, Self::Error> {
		match value {
			QueryValue::Bytes(bytes) => Ok(bytes),
			_ => Err(PoolError::Type(format!("Cannot convert {:?} to bytes", value))),
		}
	}
}

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
	ReadUncommitted,
	#[default]
	ReadCommitted,
	RepeatableRead,
	Serializable,
}

impl IsolationLevel {
	pub fn to_sql(&self) -> &'static str {
		match self {
			IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
			IsolationLevel::ReadCommitted => "READ COMMITTED",
			IsolationLevel::RepeatableRead => "REPEATABLE READ",
			IsolationLevel::Serializable => "SERIALIZABLE",
		}
	}

	/// Statement opening a transaction at this isolation level
	pub fn begin_transaction_sql(&self, db_type: DatabaseType) -> String {
		match db_type {
			DatabaseType::Postgres => format!("BEGIN ISOLATION LEVEL {}", self.to_sql()),
			// MySQL requires SET TRANSACTION before START TRANSACTION
			DatabaseType::Mysql => format!(
				"SET TRANSACTION ISOLATION LEVEL {}; START TRANSACTION",
				self.to_sql()
			),
			// SQLite only knows DEFERRED, IMMEDIATE and EXCLUSIVE
			DatabaseType::Sqlite => match self {
				IsolationLevel::Serializable => "BEGIN EXCLUSIVE".to_string(),
				_ => "BEGIN".to_string(),
			},
		}
	}
}

/// Savepoint inside an open transaction
///
/// Names are validated at construction: alphanumerics and underscores only,
/// not starting with a digit. SQL output quotes the name for the dialect.
///
/// # Examples
///
/// ```
/// use routedb_pool::{DatabaseType, Savepoint};
///
/// let sp = Savepoint::new("before_import").unwrap();
/// assert_eq!(sp.to_sql(DatabaseType::Postgres), r#"SAVEPOINT "before_import""#);
/// assert_eq!(sp.release_sql(DatabaseType::Mysql), "RELEASE SAVEPOINT `before_import`");
/// assert_eq!(
///     sp.rollback_sql(DatabaseType::Sqlite),
///     r#"ROLLBACK TO SAVEPOINT "before_import""#
/// );
///
/// assert!(Savepoint::new("1st").is_err());
/// assert!(Savepoint::new("x; DROP TABLE users").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
	name: String,
}

impl Savepoint {
	pub fn new(name: impl Into<String>) -> PoolResult<Self> {
		let name = name.into();
		validate_savepoint_name(&name).map_err(PoolError::InvalidSavepoint)?;
		Ok(Self { name })
	}

	/// The savepoint opened at nesting `depth` (1-based): `sp_{depth}`
	pub fn for_depth(depth: usize) -> Self {
		Self {
			name: format!("sp_{}", depth),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn to_sql(&self, db_type: DatabaseType) -> String {
		format!("SAVEPOINT {}", db_type.quote_identifier(&self.name))
	}

	pub fn release_sql(&self, db_type: DatabaseType) -> String {
		format!("RELEASE SAVEPOINT {}", db_type.quote_identifier(&self.name))
	}

	pub fn rollback_sql(&self, db_type: DatabaseType) -> String {
		format!("ROLLBACK TO SAVEPOINT {}", db_type.quote_identifier(&self.name))
	}
}

fn validate_savepoint_name(name: &str) -> Result<(), String> {
	if name.is_empty() {
		return Err("Savepoint name cannot be empty".to_string());
	}

	if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
		return Err(format!(
			"Savepoint name '{}' contains invalid characters. Only alphanumeric characters and underscores are allowed",
			name
		));
	}

	if let Some(first_char) = name.chars().next()
		&& first_char.is_ascii_digit()
	{
		return Err(format!(
			"Savepoint name '{}' cannot start with a number",
			name
		));
	}

	Ok(())
}
