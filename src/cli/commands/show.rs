//! Show Command
//!
//! Dump the merged configuration.
//!
//! Usage:
//!   mstarconf show [--prefix _DB] [--sources] [--resolve] [--reveal] [-f json|toml]

use crate::cli::util::CommandOptions;
use crate::context::DumpOptions;
use crate::types::Result;

pub fn run(options: &CommandOptions, dump: &DumpOptions) -> Result<()> {
    let ctx = options.load_context()?;
    let rendered = ctx.dump_config(dump)?;
    print!("{}", rendered);
    if !rendered.ends_with('\n') {
        println!();
    }
    Ok(())
}
