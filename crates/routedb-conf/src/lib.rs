//! # routedb settings
//!
//! Static configuration for data-source routing: a table mapping each route
//! key to its connection-pool parameters, plus the key used when no route key
//! is selected.
//!
//! Settings are loaded once at process startup. A missing or dangling default
//! key is a startup error, never a runtime one.
//!
//! ## Example
//!
//! ```
//! use routedb_conf::RoutingSettings;
//!
//! let settings = RoutingSettings::from_toml_str(
//!     r#"
//!     default = "master"
//!
//!     [datasources.master]
//!     url = "sqlite::memory:"
//!
//!     [datasources.slave1]
//!     url = "sqlite::memory:"
//!     max_connections = 4
//!     "#,
//! )
//! .unwrap();
//!
//! settings.validate().unwrap();
//! assert_eq!(settings.default_key(), Some("master"));
//! assert_eq!(settings.datasources["slave1"].max_connections, 4);
//! ```

pub mod datasource;
pub mod error;
pub mod settings;

pub use datasource::{DataSourceSettings, mask_url_password};
pub use error::{SettingsError, SettingsResult};
pub use settings::RoutingSettings;
