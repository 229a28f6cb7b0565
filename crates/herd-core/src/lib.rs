pub mod config;
pub mod types;

pub use config::{ConfigError, HerdConfig, PlatformKind};
pub use types::*;
