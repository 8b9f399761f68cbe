//! Pool configuration

use routedb_conf::DataSourceSettings;
use std::time::Duration;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
	pub max_connections: u32,
	pub min_connections: u32,
	pub acquire_timeout: Duration,
	pub idle_timeout: Option<Duration>,
	pub max_lifetime: Option<Duration>,
	pub test_before_acquire: bool,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			max_connections: 10,
			min_connections: 1,
			acquire_timeout: Duration::from_secs(30),
			idle_timeout: Some(Duration::from_secs(600)),
			max_lifetime: Some(Duration::from_secs(1800)),
			test_before_acquire: false,
		}
	}
}

impl PoolConfig {
	/// Create a new pool configuration with default values
	///
	/// # Examples
	///
	/// ```rust
	/// use routedb_pool::PoolConfig;
	///
	/// let config = PoolConfig::new();
	/// assert_eq!(config.max_connections, 10);
	/// ```
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_max_connections(mut self, max: u32) -> Self {
		self.max_connections = max;
		self
	}

	pub fn with_min_connections(mut self, min: u32) -> Self {
		self.min_connections = min;
		self
	}

	pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
		self.acquire_timeout = timeout;
		self
	}

	pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.idle_timeout = timeout;
		self
	}

	pub fn with_max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
		self.max_lifetime = lifetime;
		self
	}

	pub fn with_test_before_acquire(mut self, test: bool) -> Self {
		self.test_before_acquire = test;
		self
	}

	pub fn validate(&self) -> Result<(), String> {
		if self.max_connections == 0 {
			return Err("max_connections must be > 0".to_string());
		}
		if self.max_connections < self.min_connections {
			return Err("max_connections must be >= min_connections".to_string());
		}
		Ok(())
	}
}

impl From<&DataSourceSettings> for PoolConfig {
	fn from(settings: &DataSourceSettings) -> Self {
		Self {
			max_connections: settings.max_connections,
			min_connections: settings.min_connections,
			acquire_timeout: settings.acquire_timeout(),
			idle_timeout: settings.idle_timeout(),
			max_lifetime: settings.max_lifetime(),
			test_before_acquire: settings.test_before_acquire,
		}
	}
}
