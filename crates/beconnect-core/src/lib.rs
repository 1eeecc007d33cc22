pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use types::*;
