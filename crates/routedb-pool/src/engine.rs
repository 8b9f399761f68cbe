//! sqlx-backed data sources
//!
//! [`AnyDataSource`] wraps a SQLx `AnyPool`, so one type serves PostgreSQL,
//! MySQL and SQLite pools selected by URL scheme.

use super::config::PoolConfig;
use super::error::{PoolError, PoolResult};
use super::source::{Connection, DataSource};
use super::types::{DatabaseType, QueryValue, Row};
use async_trait::async_trait;
use routedb_conf::{DataSourceSettings, mask_url_password};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::pool::{PoolConnection, PoolOptions};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column, Row as _};
use uuid::Uuid;

/// A connection pool reachable through the SQLx `Any` driver
pub struct AnyDataSource {
	pool: AnyPool,
	config: PoolConfig,
	database_type: DatabaseType,
	savepoints: bool,
	masked_url: String,
}

impl AnyDataSource {
	/// Connect a new pool
	///
	/// # Examples
	///
	/// ```
	/// use routedb_pool::{AnyDataSource, DataSource, DatabaseType, PoolConfig};
	///
	/// # async fn example() {
	/// let source = AnyDataSource::connect("sqlite::memory:", PoolConfig::default())
	///     .await
	///     .unwrap();
	/// assert_eq!(source.database_type(), DatabaseType::Sqlite);
	/// assert!(source.supports_savepoints());
	/// # }
	/// # tokio::runtime::Runtime::new().unwrap().block_on(example());
	/// ```
	pub async fn connect(url: &str, config: PoolConfig) -> PoolResult<Self> {
		config.validate().map_err(PoolError::Config)?;

		let masked_url = mask_url_password(url);
		let database_type = DatabaseType::from_url(url)
			.ok_or_else(|| PoolError::Config(format!("Unsupported database URL: {}", masked_url)))?;

		sqlx::any::install_default_drivers();

		let pool = PoolOptions::<Any>::new()
			.min_connections(config.min_connections)
			.max_connections(config.max_connections)
			.acquire_timeout(config.acquire_timeout)
			.idle_timeout(config.idle_timeout)
			.max_lifetime(config.max_lifetime)
			.test_before_acquire(config.test_before_acquire)
			.connect(url)
			.await?;

		tracing::debug!(
			url = %masked_url,
			?database_type,
			max_connections = config.max_connections,
			"Connection pool created"
		);

		Ok(Self {
			pool,
			config,
			savepoints: database_type.supports_savepoints(),
			database_type,
			masked_url,
		})
	}

	/// Connect a pool described by a settings entry
	pub async fn from_settings(settings: &DataSourceSettings) -> PoolResult<Self> {
		let source = Self::connect(&settings.url, PoolConfig::from(settings)).await?;
		Ok(match settings.savepoints {
			Some(supported) => source.with_savepoints(supported),
			None => source,
		})
	}

	/// Override the savepoint capability inferred from the dialect
	pub fn with_savepoints(mut self, supported: bool) -> Self {
		self.savepoints = supported;
		self
	}

	/// Get the underlying pool
	pub fn inner(&self) -> &AnyPool {
		&self.pool
	}

	pub fn config(&self) -> &PoolConfig {
		&self.config
	}

	/// The connection URL with its password masked
	pub fn url(&self) -> &str {
		&self.masked_url
	}
}

#[async_trait]
impl DataSource for AnyDataSource {
	fn database_type(&self) -> DatabaseType {
		self.database_type
	}

	fn supports_savepoints(&self) -> bool {
		self.savepoints
	}

	async fn acquire(&self) -> PoolResult<Box<dyn Connection>> {
		let conn = self.pool.acquire().await?;
		let connection_id = Uuid::new_v4();

		tracing::trace!(%connection_id, url = %self.masked_url, "Connection acquired");

		Ok(Box::new(PooledConnection {
			conn,
			database_type: self.database_type,
			connection_id,
		}))
	}

	async fn close(&self) {
		self.pool.close().await;
		tracing::debug!(url = %self.masked_url, "Connection pool closed");
	}
}

/// A connection leased from an [`AnyDataSource`], returned to its pool on drop
pub struct PooledConnection {
	conn: PoolConnection<Any>,
	database_type: DatabaseType,
	connection_id: Uuid,
}

impl PooledConnection {
	pub fn connection_id(&self) -> Uuid {
		self.connection_id
	}
}

fn bind_params<'q>(sql: &'q str, params: Vec<QueryValue>) -> Query<'q, Any, AnyArguments<'q>> {
	let mut query = sqlx::query(sql);
	for param in params {
		query = match param {
			QueryValue::Null => query.bind(None::<String>),
			QueryValue::Bool(b) => query.bind(b),
			QueryValue::Int(i) => query.bind(i),
			QueryValue::Float(f) => query.bind(f),
			QueryValue::String(s) => query.bind(s),
			QueryValue::Bytes(bytes) => query.bind(bytes),
		};
	}
	query
}

fn convert_row(row: &AnyRow) -> Row {
	let mut converted = Row::new();
	for (index, column) in row.columns().iter().enumerate() {
		converted.insert(column.name(), decode_column(row, index));
	}
	converted
}

// NULL decodes as `None` before any type check, so the first attempt settles it.
fn decode_column(row: &AnyRow, index: usize) -> QueryValue {
	if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
		return value.map_or(QueryValue::Null, QueryValue::Int);
	}
	if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
		return value.map_or(QueryValue::Null, QueryValue::Float);
	}
	if let Ok(value) = row.try_get::<Option<String>, _>(index) {
		return value.map_or(QueryValue::Null, QueryValue::String);
	}
	if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
		return value.map_or(QueryValue::Null, QueryValue::Bool);
	}
	if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(index) {
		return value.map_or(QueryValue::Null, QueryValue::Bytes);
	}
	QueryValue::Null
}

#[async_trait]
impl Connection for PooledConnection {
	fn database_type(&self) -> DatabaseType {
		self.database_type
	}

	async fn execute(&mut self, sql: &str, params: Vec<QueryValue>) -> PoolResult<u64> {
		let result = bind_params(sql, params).execute(&mut *self.conn).await?;
		Ok(result.rows_affected())
	}

	async fn fetch_optional(
		&mut self,
		sql: &str,
		params: Vec<QueryValue>,
	) -> PoolResult<Option<Row>> {
		let row = bind_params(sql, params)
			.fetch_optional(&mut *self.conn)
			.await?;
		Ok(row.as_ref().map(convert_row))
	}

	async fn fetch_all(&mut self, sql: &str, params: Vec<QueryValue>) -> PoolResult<Vec<Row>> {
		let rows = bind_params(sql, params).fetch_all(&mut *self.conn).await?;
		Ok(rows.iter().map(convert_row).collect())
	}

	async fn execute_raw(&mut self, sql: &str) -> PoolResult<()> {
		tracing::trace!(connection_id = %self.connection_id, sql, "Executing control statement");
		// A bare `&str` carries no arguments, so it runs unprepared
		sqlx::Executor::execute(&mut *self.conn, sql).await?;
		Ok(())
	}

	fn close_on_drop(&mut self) {
		tracing::debug!(connection_id = %self.connection_id, "Connection will be closed instead of returned");
		self.conn.close_on_drop();
	}
}
