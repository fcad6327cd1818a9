//! Value Protection Commands
//!
//! Usage:
//!   mstarconf obfuscate <VALUE>
//!   mstarconf deobfuscate <OBF:...>
//!   mstarconf encrypt <NAME> <VALUE>
//!   mstarconf decrypt <NAME> <ENC:...>

use crate::cli::util::CommandOptions;
use crate::crypto;
use crate::types::Result;

pub fn obfuscate(value: &str) -> Result<()> {
    println!("{}", crypto::obfuscate(value)?);
    Ok(())
}

pub fn deobfuscate(value: &str) -> Result<()> {
    println!("{}", crypto::deobfuscate(value)?);
    Ok(())
}

/// Encrypt `value` bound to property `name`
pub fn encrypt(options: &CommandOptions, name: &str, value: &str) -> Result<()> {
    let ctx = options.load_context()?;
    println!("{}", ctx.encrypt_value(name, value)?);
    Ok(())
}

pub fn decrypt(options: &CommandOptions, name: &str, value: &str) -> Result<()> {
    let ctx = options.load_context()?;
    println!("{}", ctx.decrypt_value(name, value)?);
    Ok(())
}
