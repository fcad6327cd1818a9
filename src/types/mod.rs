pub mod config_map;
pub mod error;

pub use config_map::{ConfigMap, Provenance, SourceMap};
pub use error::{MstarError, Result, ResultExt};
