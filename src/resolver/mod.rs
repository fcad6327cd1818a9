//! Variable Resolution
//!
//! Turns `{NAME}` templates into concrete strings against an ordered stack of
//! binding sources (per-call values, overrides, base files, environment,
//! current time).

mod bindings;
mod path;
mod template;

pub use bindings::{Bindings, EnvironmentBindings, LayeredBindings, TimeBindings};
pub use path::normalize_separators;
pub use template::{Resolver, has_tokens, token_names};
