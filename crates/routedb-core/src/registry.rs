//! Route key to connection pool registry
//!
//! The registry is assembled once at startup and never changes afterwards.
//! It is shared behind an `Arc` and read without locks.

use crate::error::{RoutingError, RoutingResult};
use crate::route::RouteKey;
use indexmap::IndexMap;
use routedb_conf::RoutingSettings;
use routedb_pool::{AnyDataSource, DataSource};
use std::fmt;
use std::sync::Arc;

/// Immutable mapping from [`RouteKey`] to a physical pool
pub struct DataSourceRegistry {
	sources: IndexMap<RouteKey, Arc<dyn DataSource>>,
	default_key: RouteKey,
}

impl DataSourceRegistry {
	pub fn builder() -> DataSourceRegistryBuilder {
		DataSourceRegistryBuilder::default()
	}

	/// Connect one sqlx pool per configured data source
	///
	/// Settings are validated first, so a missing or dangling default key
	/// fails here before any pool is opened.
	pub async fn from_settings(settings: &RoutingSettings) -> RoutingResult<Self> {
		DataSourceRegistryBuilder::from_settings(settings)
			.await?
			.build()
	}

	/// Look up the pool registered under `key`
	pub fn resolve(&self, key: &RouteKey) -> RoutingResult<Arc<dyn DataSource>> {
		self.sources
			.get(key)
			.cloned()
			.ok_or_else(|| RoutingError::UnknownRouteKey(key.clone()))
	}

	/// The pool registered under the default key
	pub fn resolve_default(&self) -> RoutingResult<Arc<dyn DataSource>> {
		self.sources
			.get(&self.default_key)
			.cloned()
			.ok_or(RoutingError::NoDefaultConfigured)
	}

	pub fn default_key(&self) -> &RouteKey {
		&self.default_key
	}

	pub fn contains(&self, key: &str) -> bool {
		self.sources.contains_key(key)
	}

	/// Registered keys in registration order
	pub fn keys(&self) -> impl Iterator<Item = &RouteKey> {
		self.sources.keys()
	}

	pub fn len(&self) -> usize {
		self.sources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sources.is_empty()
	}

	/// Close every pool, waiting for leased connections to come back
	pub async fn close(&self) {
		for (key, source) in &self.sources {
			tracing::debug!(route_key = %key, "Closing data source");
			source.close().await;
		}
	}
}

impl fmt::Debug for DataSourceRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DataSourceRegistry")
			.field("keys", &self.sources.keys().collect::<Vec<_>>())
			.field("default_key", &self.default_key)
			.finish()
	}
}

/// Builder for [`DataSourceRegistry`]
///
/// # Examples
///
/// ```
/// use routedb_core::DataSourceRegistry;
/// use routedb_pool::{AnyDataSource, PoolConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = DataSourceRegistry::builder()
///     .register("master", AnyDataSource::connect("sqlite::memory:", PoolConfig::default()).await?)
///     .register("slave1", AnyDataSource::connect("sqlite::memory:", PoolConfig::default()).await?)
///     .default_key("master")
///     .build()?;
///
/// assert_eq!(registry.default_key().as_str(), "master");
/// assert_eq!(registry.len(), 2);
/// # Ok(())
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(example()).unwrap();
/// ```
#[derive(Default)]
pub struct DataSourceRegistryBuilder {
	sources: IndexMap<RouteKey, Arc<dyn DataSource>>,
	default_key: Option<RouteKey>,
	require_savepoints: bool,
}

impl DataSourceRegistryBuilder {
	/// Start from the pools described by `settings`
	pub async fn from_settings(settings: &RoutingSettings) -> RoutingResult<Self> {
		settings.validate()?;

		let mut builder = Self::default();
		for (key, datasource) in &settings.datasources {
			let source = AnyDataSource::from_settings(datasource).await?;
			tracing::debug!(route_key = %key, url = %source.url(), "Data source connected");
			builder = builder.register(key.as_str(), source);
		}

		Ok(match settings.default_key() {
			Some(key) => builder.default_key(key),
			None => builder,
		})
	}

	pub fn register<D>(self, key: impl Into<RouteKey>, source: D) -> Self
	where
		D: DataSource + 'static,
	{
		self.register_shared(key, Arc::new(source))
	}

	/// Register a pool that is also held elsewhere
	pub fn register_shared(mut self, key: impl Into<RouteKey>, source: Arc<dyn DataSource>) -> Self {
		let key = key.into();
		if self.sources.insert(key.clone(), source).is_some() {
			tracing::warn!(route_key = %key, "Data source registered twice; keeping the last one");
		}
		self
	}

	pub fn default_key(mut self, key: impl Into<RouteKey>) -> Self {
		self.default_key = Some(key.into());
		self
	}

	/// Reject pools that cannot open savepoints, so `NESTED` never falls
	/// back to joining the outer transaction
	pub fn require_savepoints(mut self, required: bool) -> Self {
		self.require_savepoints = required;
		self
	}

	pub fn build(self) -> RoutingResult<DataSourceRegistry> {
		let default_key = self.default_key.ok_or(RoutingError::NoDefaultConfigured)?;
		if !self.sources.contains_key(&default_key) {
			return Err(RoutingError::UnknownRouteKey(default_key));
		}

		if self.require_savepoints
			&& let Some((key, _)) = self
				.sources
				.iter()
				.find(|(_, source)| !source.supports_savepoints())
		{
			return Err(RoutingError::SavepointsUnsupported { key: key.clone() });
		}

		tracing::debug!(
			keys = ?self.sources.keys().map(RouteKey::as_str).collect::<Vec<_>>(),
			default_key = %default_key,
			"Data source registry built"
		);

		Ok(DataSourceRegistry {
			sources: self.sources,
			default_key,
		})
	}
}
