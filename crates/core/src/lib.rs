//! Mapfile core library.
//!
//! Maps an authenticated principal and the method that authenticated it to
//! a canonical identity, and a canonical identity to a local account. The
//! rules come from line-oriented mapfiles:
//!
//! ```text
//! KERBEROS  /^(.*)@EXAMPLE\.COM$/  \1
//! SSL       "/DC=org/CN=Alice"     alice
//! @include  mapfile.d
//! ```
//!
//! See [`mapfile::MapFile`] for the engine and [`config::MapConfig`] for
//! the TOML configuration that names the sources to load.

pub mod config;
pub mod errors;
pub mod mapfile;

// Re-exports for convenience.
pub use config::MapConfig;
pub use errors::{ConfigError, CoreError, MapFileError};
pub use mapfile::{LoadOptions, LoadReport, MapFile, MapFileUsage, SharedMapFile};
