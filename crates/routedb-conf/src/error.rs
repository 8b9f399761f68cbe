//! Settings errors

/// Error raised while loading or validating routing settings.
///
/// Every variant is a startup-time failure.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("No default data source configured")]
	NoDefault,

	#[error("Default data source '{0}' is not configured")]
	UnknownDefault(String),

	#[error("Invalid data source '{key}': {reason}")]
	InvalidDataSource { key: String, reason: String },
}

pub type SettingsResult<T> = Result<T, SettingsError>;
