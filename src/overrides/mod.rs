//! Operator overrides persisted across restarts
//!
//! Overrides are grouped per logical configuration file and merged on top of
//! the base files at load time, so they always win over file values.

mod model;
mod store;

pub use model::{OverrideFile, OverrideSet};
pub use store::OverrideStore;
