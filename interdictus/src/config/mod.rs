//! User configuration stored in `~/.interdictus/config.ini`.
//!
//! Settings structs live in [`settings`], constants in [`defaults`], parsing
//! in `parser`, and serialization in `writer`. A missing file means
//! defaults; an invalid value is an error naming the section and key.
//!
//! # Example
//!
//! ```
//! use interdictus::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! let analysis = config.analysis_config();
//! assert!(analysis.threads >= 1);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::*;
