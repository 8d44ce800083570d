//! Configuration loading and validation
//!
//! TOML configuration with typed structs, defaults for every option, a
//! validation pass, and a content hash recorded at startup.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{
    AnonymityConfig, Config, CrawlerConfig, FilterConfig, NotifyConfig, OutputConfig,
};
pub use validation::{validate, validate_seed_url};
