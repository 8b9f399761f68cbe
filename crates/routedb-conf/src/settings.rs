//! Routing settings: the route key table and its default

use super::datasource::DataSourceSettings;
use super::error::{SettingsError, SettingsResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// The `{route key -> pool parameters}` table plus the designated default key
///
/// # Examples
///
/// ```
/// use routedb_conf::{DataSourceSettings, RoutingSettings};
///
/// let settings = RoutingSettings::new()
///     .with_datasource("master", DataSourceSettings::sqlite("master.db"))
///     .with_datasource("slave1", DataSourceSettings::sqlite("slave1.db"))
///     .with_default("master");
///
/// assert!(settings.validate().is_ok());
/// assert_eq!(settings.keys().collect::<Vec<_>>(), vec!["master", "slave1"]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingSettings {
	/// Route key used when a unit of work has not selected one
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default: Option<String>,

	#[serde(default)]
	pub datasources: IndexMap<String, DataSourceSettings>,
}

impl RoutingSettings {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_default(mut self, key: impl Into<String>) -> Self {
		self.default = Some(key.into());
		self
	}

	pub fn with_datasource(mut self, key: impl Into<String>, settings: DataSourceSettings) -> Self {
		self.datasources.insert(key.into(), settings);
		self
	}

	pub fn default_key(&self) -> Option<&str> {
		self.default.as_deref()
	}

	/// Route keys in declaration order
	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.datasources.keys().map(String::as_str)
	}

	/// Parse settings from a TOML document
	pub fn from_toml_str(content: &str) -> SettingsResult<Self> {
		Ok(toml::from_str(content)?)
	}

	/// Load settings from a TOML file
	pub fn from_path(path: impl AsRef<Path>) -> SettingsResult<Self> {
		let path = path.as_ref();
		let content = fs::read_to_string(path)?;
		let settings = Self::from_toml_str(&content)?;
		tracing::debug!(
			path = %path.display(),
			datasources = settings.datasources.len(),
			"Loaded routing settings"
		);
		Ok(settings)
	}

	/// Verify the table is usable: a default key naming a configured data
	/// source, and sane pool parameters for every entry.
	pub fn validate(&self) -> SettingsResult<()> {
		let default = self.default.as_deref().ok_or(SettingsError::NoDefault)?;
		if !self.datasources.contains_key(default) {
			return Err(SettingsError::UnknownDefault(default.to_string()));
		}
		for (key, datasource) in &self.datasources {
			datasource.validate(key)?;
		}
		Ok(())
	}

	/// Apply overrides from process environment variables starting with `prefix`
	///
	/// See [`RoutingSettings::apply_overrides`].
	pub fn apply_env_overrides(&mut self, prefix: &str) {
		self.apply_overrides(prefix, std::env::vars());
	}

	/// Apply overrides from `(name, value)` pairs starting with `prefix`
	///
	/// - `{prefix}DEFAULT` replaces the default key
	/// - `{prefix}{KEY}_URL` replaces the URL of data source `key`
	///   (case-insensitive), adding the data source when it is not configured
	///
	/// # Examples
	///
	/// ```
	/// use routedb_conf::{DataSourceSettings, RoutingSettings};
	///
	/// let mut settings = RoutingSettings::new()
	///     .with_datasource("master", DataSourceSettings::new("sqlite::memory:"))
	///     .with_default("master");
	///
	/// settings.apply_overrides(
	///     "ROUTEDB_",
	///     vec![
	///         ("ROUTEDB_MASTER_URL".to_string(), "postgres://db/app".to_string()),
	///         ("UNRELATED".to_string(), "ignored".to_string()),
	///     ],
	/// );
	///
	/// assert_eq!(settings.datasources["master"].url, "postgres://db/app");
	/// ```
	pub fn apply_overrides<I>(&mut self, prefix: &str, vars: I)
	where
		I: IntoIterator<Item = (String, String)>,
	{
		for (name, value) in vars {
			let Some(rest) = name.strip_prefix(prefix) else {
				continue;
			};

			if rest == "DEFAULT" {
				tracing::debug!(default = %value, "Default route key overridden from environment");
				self.default = Some(value);
				continue;
			}

			let Some(key) = rest.strip_suffix("_URL").filter(|k| !k.is_empty()) else {
				continue;
			};

			let existing = self
				.datasources
				.keys()
				.find(|k| k.eq_ignore_ascii_case(key))
				.cloned();

			match existing {
				Some(existing) => {
					if let Some(datasource) = self.datasources.get_mut(&existing) {
						datasource.url = value;
						tracing::debug!(key = %existing, url = %datasource.masked_url(), "Data source URL overridden from environment");
					}
				}
				None => {
					let key = key.to_ascii_lowercase();
					let datasource = DataSourceSettings::new(value);
					tracing::debug!(key = %key, url = %datasource.masked_url(), "Data source added from environment");
					self.datasources.insert(key, datasource);
				}
			}
		}
	}
}
