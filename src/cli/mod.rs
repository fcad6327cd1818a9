pub mod commands;
pub mod ui;
pub mod util;

pub use ui::Output;
pub use util::{CommandOptions, ListFormat, SettingsFormat, parse_define, read_password};
