//! Common types for the certsuite QE harness: errors, configuration and
//! logging setup shared by the resource engine and the CLI.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{ExistencePolicy, SuiteConfig};
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name used for every write issued by the harness
pub const FIELD_MANAGER: &str = "certsuite-qe";

/// Label key marking objects created by the harness
pub const MANAGED_BY_LABEL_KEY: &str = "app.kubernetes.io/managed-by";
